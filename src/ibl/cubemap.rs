use glam::{Mat3, Mat4, Vec3};

/// Cube faces in texture layer order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CubeFace {
    PositiveX,
    NegativeX,
    PositiveY,
    NegativeY,
    PositiveZ,
    NegativeZ,
}

impl CubeFace {
    pub const ALL: [CubeFace; 6] = [
        CubeFace::PositiveX,
        CubeFace::NegativeX,
        CubeFace::PositiveY,
        CubeFace::NegativeY,
        CubeFace::PositiveZ,
        CubeFace::NegativeZ,
    ];

    pub fn layer(self) -> u32 {
        self as u32
    }

    pub fn label(self) -> &'static str {
        match self {
            CubeFace::PositiveX => "+X",
            CubeFace::NegativeX => "-X",
            CubeFace::PositiveY => "+Y",
            CubeFace::NegativeY => "-Y",
            CubeFace::PositiveZ => "+Z",
            CubeFace::NegativeZ => "-Z",
        }
    }

    /// Unnormalized direction through face coordinates `u`, `v` in `[-1, 1]`,
    /// `v` growing downwards (texel row order).
    pub fn direction(self, u: f32, v: f32) -> Vec3 {
        match self {
            CubeFace::PositiveX => Vec3::new(1.0, -v, -u),
            CubeFace::NegativeX => Vec3::new(-1.0, -v, u),
            CubeFace::PositiveY => Vec3::new(u, 1.0, v),
            CubeFace::NegativeY => Vec3::new(u, -1.0, -v),
            CubeFace::PositiveZ => Vec3::new(u, -v, 1.0),
            CubeFace::NegativeZ => Vec3::new(-u, -v, -1.0),
        }
    }

    /// Face and face coordinates hit by `dir`.
    pub fn locate(dir: Vec3) -> (CubeFace, f32, f32) {
        let abs = dir.abs();
        if abs.x >= abs.y && abs.x >= abs.z {
            let m = abs.x.max(f32::MIN_POSITIVE);
            if dir.x >= 0.0 {
                (CubeFace::PositiveX, -dir.z / m, -dir.y / m)
            } else {
                (CubeFace::NegativeX, dir.z / m, -dir.y / m)
            }
        } else if abs.y >= abs.z {
            let m = abs.y.max(f32::MIN_POSITIVE);
            if dir.y >= 0.0 {
                (CubeFace::PositiveY, dir.x / m, dir.z / m)
            } else {
                (CubeFace::NegativeY, dir.x / m, -dir.z / m)
            }
        } else {
            let m = abs.z.max(f32::MIN_POSITIVE);
            if dir.z >= 0.0 {
                (CubeFace::PositiveZ, dir.x / m, -dir.y / m)
            } else {
                (CubeFace::NegativeZ, -dir.x / m, -dir.y / m)
            }
        }
    }

    /// View matrix for rendering this face from the origin with a 90° frustum.
    /// Pixel `(x, y)` of the face sees [`texel_direction`] of the same texel.
    pub fn capture_view(self) -> Mat4 {
        let forward = self.direction(0.0, 0.0);
        let right = self.direction(1.0, 0.0) - forward;
        let up = forward - self.direction(0.0, 1.0);
        Mat4::from_mat3(Mat3::from_cols(right, up, -forward).transpose())
    }
}

pub const CAPTURE_FOV_Y: f32 = std::f32::consts::FRAC_PI_2;
pub const CAPTURE_NEAR: f32 = 0.1;
pub const CAPTURE_FAR: f32 = 10.0;

pub fn capture_projection() -> Mat4 {
    Mat4::perspective_rh(CAPTURE_FOV_Y, 1.0, CAPTURE_NEAR, CAPTURE_FAR)
}

pub fn texel_uv(x: u32, y: u32, size: u32) -> (f32, f32) {
    let inv = 1.0 / size.max(1) as f32;
    ((x as f32 + 0.5) * 2.0 * inv - 1.0, (y as f32 + 0.5) * 2.0 * inv - 1.0)
}

pub fn texel_direction(face: CubeFace, x: u32, y: u32, size: u32) -> Vec3 {
    let (u, v) = texel_uv(x, y, size);
    face.direction(u, v).normalize()
}

fn area_element(x: f32, y: f32) -> f32 {
    (x * y).atan2((x * x + y * y + 1.0).sqrt())
}

/// Exact solid angle covered by texel `(x, y)` of a cube face of `size` texels.
pub fn texel_solid_angle(x: u32, y: u32, size: u32) -> f32 {
    let inv = 1.0 / size.max(1) as f32;
    let x0 = x as f32 * 2.0 * inv - 1.0;
    let y0 = y as f32 * 2.0 * inv - 1.0;
    let x1 = x0 + 2.0 * inv;
    let y1 = y0 + 2.0 * inv;
    area_element(x0, y0) - area_element(x0, y1) - area_element(x1, y0) + area_element(x1, y1)
}

/// Single-level RGB cubemap used as a CPU reference.
#[derive(Debug, Clone)]
pub struct CpuCubemap {
    size: u32,
    faces: [Vec<Vec3>; 6],
}

impl CpuCubemap {
    pub fn uniform(size: u32, color: Vec3) -> Self {
        let size = size.max(1);
        let texels = (size * size) as usize;
        Self { size, faces: std::array::from_fn(|_| vec![color; texels]) }
    }

    pub fn from_fn(size: u32, radiance: impl Fn(Vec3) -> Vec3) -> Self {
        let size = size.max(1);
        let faces = std::array::from_fn(|index| {
            let face = CubeFace::ALL[index];
            let mut texels = Vec::with_capacity((size * size) as usize);
            for y in 0..size {
                for x in 0..size {
                    texels.push(radiance(texel_direction(face, x, y, size)));
                }
            }
            texels
        });
        Self { size, faces }
    }

    pub fn size(&self) -> u32 {
        self.size
    }

    pub fn face(&self, face: CubeFace) -> &[Vec3] {
        &self.faces[face.layer() as usize]
    }

    pub fn texel(&self, face: CubeFace, x: u32, y: u32) -> Vec3 {
        let x = x.min(self.size - 1);
        let y = y.min(self.size - 1);
        self.faces[face.layer() as usize][(y * self.size + x) as usize]
    }

    /// Bilinear lookup within the face `dir` hits; edges clamp to the face.
    pub fn sample(&self, dir: Vec3) -> Vec3 {
        let (face, u, v) = CubeFace::locate(dir);
        let size = self.size as f32;
        let px = ((u + 1.0) * 0.5 * size - 0.5).clamp(0.0, size - 1.0);
        let py = ((v + 1.0) * 0.5 * size - 0.5).clamp(0.0, size - 1.0);
        let x0 = px.floor() as u32;
        let y0 = py.floor() as u32;
        let tx = px - x0 as f32;
        let ty = py - y0 as f32;
        let top = self.texel(face, x0, y0).lerp(self.texel(face, x0 + 1, y0), tx);
        let bottom = self.texel(face, x0, y0 + 1).lerp(self.texel(face, x0 + 1, y0 + 1), tx);
        top.lerp(bottom, ty)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::PI;

    #[test]
    fn face_directions_point_along_face_axes() {
        let expected = [Vec3::X, -Vec3::X, Vec3::Y, -Vec3::Y, Vec3::Z, -Vec3::Z];
        for (face, axis) in CubeFace::ALL.into_iter().zip(expected) {
            assert_eq!(face.direction(0.0, 0.0), axis, "{}", face.label());
        }
    }

    #[test]
    fn locate_inverts_direction() {
        for face in CubeFace::ALL {
            for (u, v) in [(-0.75, 0.5), (0.25, -0.9), (0.0, 0.0), (0.6, 0.6)] {
                let (found, fu, fv) = CubeFace::locate(face.direction(u, v).normalize());
                assert_eq!(found, face);
                assert!((fu - u).abs() < 1e-5 && (fv - v).abs() < 1e-5, "{} {u} {v}", face.label());
            }
        }
    }

    #[test]
    fn capture_views_project_texels_to_matching_pixels() {
        let projection = capture_projection();
        for face in CubeFace::ALL {
            let view_proj = projection * face.capture_view();
            for (u, v) in [(-0.5, -0.5), (0.5, 0.25), (0.9, -0.1)] {
                let clip = view_proj * face.direction(u, v).extend(1.0);
                let ndc = clip.truncate() / clip.w;
                assert!((ndc.x - u).abs() < 1e-5, "{} x", face.label());
                assert!((ndc.y + v).abs() < 1e-5, "{} y", face.label());
                assert!((0.0..=1.0).contains(&ndc.z));
            }
        }
    }

    #[test]
    fn texel_solid_angles_cover_the_sphere() {
        let size = 32;
        let mut total = 0.0f64;
        for y in 0..size {
            for x in 0..size {
                total += texel_solid_angle(x, y, size) as f64;
            }
        }
        let sphere = total * 6.0;
        assert!((sphere - 4.0 * PI as f64).abs() < 1e-3, "total {sphere}");
    }

    #[test]
    fn center_texels_cover_more_than_corner_texels() {
        assert!(texel_solid_angle(8, 8, 16) > texel_solid_angle(0, 0, 16));
    }

    #[test]
    fn sampling_texel_centers_returns_texels() {
        let cube = CpuCubemap::from_fn(8, |dir| dir * 0.5 + Vec3::splat(0.5));
        for face in CubeFace::ALL {
            let dir = texel_direction(face, 3, 5, 8);
            assert!((cube.sample(dir) - cube.texel(face, 3, 5)).length() < 1e-5);
        }
    }
}
