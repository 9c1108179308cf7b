use glam::Vec3;
use std::f32::consts::{PI, TAU};
use wgpu::util::DeviceExt;

#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub struct MeshVertex {
    pub position: [f32; 3],
    pub normal: [f32; 3],
}

impl MeshVertex {
    pub fn new(position: Vec3, normal: Vec3) -> Self {
        Self { position: position.to_array(), normal: normal.to_array() }
    }

    pub fn layout<'a>() -> wgpu::VertexBufferLayout<'a> {
        use std::mem;
        wgpu::VertexBufferLayout {
            array_stride: mem::size_of::<MeshVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &[
                wgpu::VertexAttribute {
                    offset: 0,
                    shader_location: 0,
                    format: wgpu::VertexFormat::Float32x3,
                },
                wgpu::VertexAttribute {
                    offset: 12,
                    shader_location: 1,
                    format: wgpu::VertexFormat::Float32x3,
                },
            ],
        }
    }
}

#[derive(Clone, Debug)]
pub struct Mesh {
    pub vertices: Vec<MeshVertex>,
    pub indices: Vec<u32>,
}

impl Mesh {
    pub fn new(vertices: Vec<MeshVertex>, indices: Vec<u32>) -> Self {
        Self { vertices, indices }
    }

    /// Axis-aligned cube centred on the origin with per-face normals.
    pub fn cube(size: f32) -> Self {
        let hs = size * 0.5;
        let positions = [
            Vec3::new(-hs, -hs, -hs),
            Vec3::new(hs, -hs, -hs),
            Vec3::new(hs, hs, -hs),
            Vec3::new(-hs, hs, -hs),
            Vec3::new(-hs, -hs, hs),
            Vec3::new(hs, -hs, hs),
            Vec3::new(hs, hs, hs),
            Vec3::new(-hs, hs, hs),
        ];
        let mut vertices = Vec::with_capacity(24);
        let mut write_face = |corners: [usize; 4], normal: Vec3| {
            for index in corners {
                vertices.push(MeshVertex::new(positions[index], normal));
            }
        };
        write_face([0, 3, 2, 1], -Vec3::Z);
        write_face([4, 5, 6, 7], Vec3::Z);
        write_face([0, 4, 7, 3], -Vec3::X);
        write_face([1, 2, 6, 5], Vec3::X);
        write_face([3, 7, 6, 2], Vec3::Y);
        write_face([0, 1, 5, 4], -Vec3::Y);

        let mut indices = Vec::with_capacity(36);
        for face in 0..6 {
            let base = face * 4;
            indices.extend_from_slice(&[base, base + 1, base + 2, base, base + 2, base + 3]);
        }
        Self::new(vertices, indices)
    }

    /// Latitude/longitude sphere with counter-clockwise outward-facing triangles.
    pub fn uv_sphere(radius: f32, segments: u32, rings: u32) -> Self {
        let segments = segments.max(3);
        let rings = rings.max(2);
        let mut vertices = Vec::with_capacity(((segments + 1) * (rings + 1)) as usize);
        for ring in 0..=rings {
            let theta = ring as f32 / rings as f32 * PI;
            for segment in 0..=segments {
                let phi = segment as f32 / segments as f32 * TAU;
                let normal = Vec3::new(theta.sin() * phi.cos(), theta.cos(), theta.sin() * phi.sin());
                vertices.push(MeshVertex::new(normal * radius, normal));
            }
        }
        let stride = segments + 1;
        let mut indices = Vec::with_capacity((segments * rings * 6) as usize);
        for ring in 0..rings {
            for segment in 0..segments {
                let a = ring * stride + segment;
                let b = a + stride;
                indices.extend_from_slice(&[a, a + 1, b, a + 1, b + 1, b]);
            }
        }
        Self::new(vertices, indices)
    }
}

/// Vertex and index buffers for one mesh.
pub struct GpuMesh {
    pub vertex_buffer: wgpu::Buffer,
    pub index_buffer: wgpu::Buffer,
    pub index_count: u32,
}

impl GpuMesh {
    pub fn upload(device: &wgpu::Device, label: &str, mesh: &Mesh) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Vertices")),
            contents: bytemuck::cast_slice(&mesh.vertices),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some(&format!("{label} Indices")),
            contents: bytemuck::cast_slice(&mesh.indices),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self { vertex_buffer, index_buffer, index_count: mesh.indices.len() as u32 }
    }

    pub fn draw(&self, pass: &mut wgpu::RenderPass<'_>, instances: std::ops::Range<u32>) {
        pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        pass.set_index_buffer(self.index_buffer.slice(..), wgpu::IndexFormat::Uint32);
        pass.draw_indexed(0..self.index_count, 0, instances);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn triangle_normal(mesh: &Mesh, tri: &[u32]) -> Vec3 {
        let p = |i: u32| Vec3::from_array(mesh.vertices[i as usize].position);
        (p(tri[1]) - p(tri[0])).cross(p(tri[2]) - p(tri[0]))
    }

    #[test]
    fn cube_has_six_quads() {
        let cube = Mesh::cube(2.0);
        assert_eq!(cube.vertices.len(), 24);
        assert_eq!(cube.indices.len(), 36);
        assert!(cube.vertices.iter().all(|v| v.position.iter().all(|c| c.abs() == 1.0)));
    }

    #[test]
    fn sphere_vertices_lie_on_radius_with_unit_normals() {
        let sphere = Mesh::uv_sphere(2.0, 16, 8);
        for vertex in &sphere.vertices {
            let position = Vec3::from_array(vertex.position);
            let normal = Vec3::from_array(vertex.normal);
            assert!((position.length() - 2.0).abs() < 1e-5);
            assert!((normal.length() - 1.0).abs() < 1e-5);
        }
        assert_eq!(sphere.indices.len(), 16 * 8 * 6);
    }

    #[test]
    fn sphere_triangles_face_outwards() {
        let sphere = Mesh::uv_sphere(1.0, 12, 6);
        for tri in sphere.indices.chunks_exact(3) {
            let normal = triangle_normal(&sphere, tri);
            if normal.length() < 1e-6 {
                continue;
            }
            let centroid: Vec3 =
                tri.iter().map(|i| Vec3::from_array(sphere.vertices[*i as usize].position)).sum::<Vec3>() / 3.0;
            assert!(normal.dot(centroid) > 0.0);
        }
    }
}
