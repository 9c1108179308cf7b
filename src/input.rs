use glam::{Vec2, Vec3};
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::fs;
use std::path::Path;
use winit::event::{DeviceEvent, ElementState, MouseButton, WindowEvent};
use winit::keyboard::{Key, NamedKey};

use crate::camera3d::FreeflyInput;

pub const DEFAULT_BINDINGS_PATH: &str = "config/input.json";

pub struct Input {
    bindings: InputBindings,
    mouse_delta: Vec2,
    held: HashSet<InputAction>,
    triggered: Vec<InputAction>,
    right_pressed: bool,
}

impl Input {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(path: impl AsRef<Path>) -> Self {
        Self::with_bindings(InputBindings::load_or_default(path))
    }

    fn with_bindings(bindings: InputBindings) -> Self {
        Self {
            bindings,
            mouse_delta: Vec2::ZERO,
            held: HashSet::new(),
            triggered: Vec::new(),
            right_pressed: false,
        }
    }

    pub fn push(&mut self, ev: InputEvent) {
        match ev {
            InputEvent::Key { key, pressed } => self.apply_key_binding(&key, pressed),
            InputEvent::MouseMove { dx, dy } => self.mouse_delta += Vec2::new(dx, dy),
            InputEvent::MouseButton { button: MouseButton::Right, pressed } => self.right_pressed = pressed,
            InputEvent::MouseButton { .. } | InputEvent::Other => {}
        }
    }

    pub fn clear_frame(&mut self) {
        self.mouse_delta = Vec2::ZERO;
        self.triggered.clear();
    }

    /// Discrete actions pressed since the last call, in press order.
    pub fn take_triggered(&mut self) -> Vec<InputAction> {
        std::mem::take(&mut self.triggered)
    }

    pub fn held(&self, action: InputAction) -> bool {
        self.held.contains(&action)
    }

    /// Movement axes from held keys; mouse look only while the right button is down.
    pub fn freefly_input(&self) -> FreeflyInput {
        let axis = |positive, negative| {
            (self.held(positive) as i32 - self.held(negative) as i32) as f32
        };
        FreeflyInput {
            movement: Vec3::new(
                axis(InputAction::FreeflyRight, InputAction::FreeflyLeft),
                axis(InputAction::FreeflyAscend, InputAction::FreeflyDescend),
                axis(InputAction::FreeflyForward, InputAction::FreeflyBackward),
            ),
            look: if self.right_pressed { self.mouse_delta } else { Vec2::ZERO },
            boost: self.held(InputAction::FreeflyBoost),
        }
    }

    fn apply_key_binding(&mut self, key: &Key, pressed: bool) {
        let Some(binding_key) = InputKeyBinding::from_event_key(key) else {
            return;
        };
        let actions: Vec<_> = self.bindings.actions_for_key(&binding_key).collect();
        for action in actions {
            if action.is_held() {
                if pressed {
                    self.held.insert(action);
                } else {
                    self.held.remove(&action);
                }
            } else if pressed {
                self.triggered.push(action);
            }
        }
    }
}

impl Default for Input {
    fn default() -> Self {
        Self::with_bindings(InputBindings::default())
    }
}

#[derive(Debug, Clone)]
struct InputBindings {
    key_to_actions: HashMap<InputKeyBinding, Vec<InputAction>>,
}

impl InputBindings {
    fn load_or_default(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        match fs::read_to_string(path) {
            Ok(contents) => match serde_json::from_str::<InputConfigFile>(&contents) {
                Ok(config) => Self::from_config(config, &path.display().to_string()),
                Err(err) => {
                    log::warn!(
                        "[input] Failed to parse {}: {err}. Falling back to default bindings.",
                        path.display()
                    );
                    Self::default()
                }
            },
            Err(err) => {
                log::info!("[input] {} not read ({err}); using default bindings.", path.display());
                Self::default()
            }
        }
    }

    fn from_config(config: InputConfigFile, origin: &str) -> Self {
        let mut action_map = Self::default_action_map();
        for (action, keys) in config.into_overrides(origin) {
            action_map.insert(action, keys);
        }
        Self::from_action_map(action_map)
    }

    fn default_action_map() -> HashMap<InputAction, Vec<InputKeyBinding>> {
        use InputAction::*;
        let mut map = HashMap::new();
        map.insert(FreeflyForward, vec![InputKeyBinding::character("w")]);
        map.insert(FreeflyBackward, vec![InputKeyBinding::character("s")]);
        map.insert(FreeflyLeft, vec![InputKeyBinding::character("a")]);
        map.insert(FreeflyRight, vec![InputKeyBinding::character("d")]);
        map.insert(FreeflyAscend, vec![InputKeyBinding::character("e")]);
        map.insert(FreeflyDescend, vec![InputKeyBinding::character("q")]);
        map.insert(FreeflyBoost, vec![InputKeyBinding::named(NamedKeyCode::Shift)]);
        map.insert(ShowEnvironment, vec![InputKeyBinding::character("1")]);
        map.insert(ShowIrradiance, vec![InputKeyBinding::character("2")]);
        map.insert(ShowPrefiltered, vec![InputKeyBinding::character("3")]);
        map.insert(ShowSky, vec![InputKeyBinding::character("4")]);
        map.insert(CycleDisplayMode, vec![InputKeyBinding::named(NamedKeyCode::Tab)]);
        map.insert(RoughnessDown, vec![InputKeyBinding::character("[")]);
        map.insert(RoughnessUp, vec![InputKeyBinding::character("]")]);
        map.insert(SamplesDown, vec![InputKeyBinding::character("-")]);
        map.insert(SamplesUp, vec![InputKeyBinding::character("=")]);
        map.insert(SunDown, vec![InputKeyBinding::named(NamedKeyCode::ArrowDown)]);
        map.insert(SunUp, vec![InputKeyBinding::named(NamedKeyCode::ArrowUp)]);
        map.insert(ToggleDebugOverlay, vec![InputKeyBinding::character("k")]);
        map.insert(Quit, vec![InputKeyBinding::named(NamedKeyCode::Escape)]);
        map
    }

    fn from_action_map(action_map: HashMap<InputAction, Vec<InputKeyBinding>>) -> Self {
        let mut key_to_actions: HashMap<InputKeyBinding, Vec<InputAction>> = HashMap::new();
        for (action, keys) in action_map {
            for key in keys {
                key_to_actions.entry(key).or_default().push(action);
            }
        }
        Self { key_to_actions }
    }

    fn actions_for_key(&self, key: &InputKeyBinding) -> impl Iterator<Item = InputAction> + '_ {
        self.key_to_actions.get(key).into_iter().flatten().copied()
    }
}

impl Default for InputBindings {
    fn default() -> Self {
        Self::from_action_map(Self::default_action_map())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum InputKeyBinding {
    Character(String),
    Named(NamedKeyCode),
}

impl InputKeyBinding {
    fn character(ch: &str) -> Self {
        Self::Character(ch.to_lowercase())
    }

    fn named(named: NamedKeyCode) -> Self {
        Self::Named(named)
    }

    fn from_event_key(key: &Key) -> Option<Self> {
        match key {
            Key::Character(ch) if !ch.is_empty() => Some(Self::Character(ch.to_lowercase())),
            Key::Named(named) => NamedKeyCode::from_named_key(named).map(Self::Named),
            _ => None,
        }
    }

    fn from_config_value(raw: &str) -> Option<Self> {
        let normalized = raw.trim().to_lowercase();
        if let Some(named) = NamedKeyCode::from_str(&normalized) {
            return Some(Self::Named(named));
        }
        (normalized.chars().count() == 1).then_some(Self::Character(normalized))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum NamedKeyCode {
    Shift,
    Tab,
    Escape,
    ArrowUp,
    ArrowDown,
}

impl NamedKeyCode {
    fn from_named_key(key: &NamedKey) -> Option<Self> {
        match key {
            NamedKey::Shift => Some(Self::Shift),
            NamedKey::Tab => Some(Self::Tab),
            NamedKey::Escape => Some(Self::Escape),
            NamedKey::ArrowUp => Some(Self::ArrowUp),
            NamedKey::ArrowDown => Some(Self::ArrowDown),
            _ => None,
        }
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "shift" | "left_shift" | "right_shift" => Some(Self::Shift),
            "tab" => Some(Self::Tab),
            "escape" | "esc" => Some(Self::Escape),
            "up" | "arrow_up" => Some(Self::ArrowUp),
            "down" | "arrow_down" => Some(Self::ArrowDown),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum InputAction {
    FreeflyForward,
    FreeflyBackward,
    FreeflyLeft,
    FreeflyRight,
    FreeflyAscend,
    FreeflyDescend,
    FreeflyBoost,
    ShowEnvironment,
    ShowIrradiance,
    ShowPrefiltered,
    ShowSky,
    CycleDisplayMode,
    RoughnessDown,
    RoughnessUp,
    SamplesDown,
    SamplesUp,
    SunDown,
    SunUp,
    ToggleDebugOverlay,
    Quit,
}

impl InputAction {
    fn is_held(self) -> bool {
        matches!(
            self,
            InputAction::FreeflyForward
                | InputAction::FreeflyBackward
                | InputAction::FreeflyLeft
                | InputAction::FreeflyRight
                | InputAction::FreeflyAscend
                | InputAction::FreeflyDescend
                | InputAction::FreeflyBoost
        )
    }

    fn from_str(value: &str) -> Option<Self> {
        match value {
            "freefly_forward" => Some(Self::FreeflyForward),
            "freefly_backward" => Some(Self::FreeflyBackward),
            "freefly_left" => Some(Self::FreeflyLeft),
            "freefly_right" => Some(Self::FreeflyRight),
            "freefly_ascend" => Some(Self::FreeflyAscend),
            "freefly_descend" => Some(Self::FreeflyDescend),
            "freefly_boost" => Some(Self::FreeflyBoost),
            "show_environment" => Some(Self::ShowEnvironment),
            "show_irradiance" => Some(Self::ShowIrradiance),
            "show_prefiltered" => Some(Self::ShowPrefiltered),
            "show_sky" => Some(Self::ShowSky),
            "cycle_display_mode" => Some(Self::CycleDisplayMode),
            "roughness_down" => Some(Self::RoughnessDown),
            "roughness_up" => Some(Self::RoughnessUp),
            "samples_down" => Some(Self::SamplesDown),
            "samples_up" => Some(Self::SamplesUp),
            "sun_down" => Some(Self::SunDown),
            "sun_up" => Some(Self::SunUp),
            "toggle_debug_overlay" => Some(Self::ToggleDebugOverlay),
            "quit" => Some(Self::Quit),
            _ => None,
        }
    }
}

#[derive(Debug, Deserialize)]
struct InputConfigFile {
    #[serde(default)]
    bindings: HashMap<String, Vec<String>>,
}

impl InputConfigFile {
    fn into_overrides(self, origin: &str) -> HashMap<InputAction, Vec<InputKeyBinding>> {
        let mut overrides = HashMap::new();
        for (action_name, keys) in self.bindings {
            let Some(action) = InputAction::from_str(&action_name.trim().to_lowercase()) else {
                log::warn!("[input] {origin}: unknown action '{action_name}', ignoring.");
                continue;
            };
            let mut parsed = Vec::new();
            for key in keys {
                match InputKeyBinding::from_config_value(&key) {
                    Some(binding) => parsed.push(binding),
                    None => {
                        log::warn!("[input] {origin}: unknown key '{key}' for action '{action_name}', ignoring.")
                    }
                }
            }
            if parsed.is_empty() {
                log::warn!("[input] {origin}: action '{action_name}' has no valid keys, keeping defaults.");
                continue;
            }
            overrides.insert(action, parsed);
        }
        overrides
    }
}

pub enum InputEvent {
    Key { key: Key, pressed: bool },
    MouseMove { dx: f32, dy: f32 },
    MouseButton { button: MouseButton, pressed: bool },
    Other,
}

impl InputEvent {
    pub fn from_window_event(ev: &WindowEvent) -> Self {
        match ev {
            WindowEvent::MouseInput { state, button, .. } => {
                InputEvent::MouseButton { button: *button, pressed: *state == ElementState::Pressed }
            }
            WindowEvent::KeyboardInput { event, .. } => InputEvent::Key {
                key: event.logical_key.clone(),
                pressed: event.state == ElementState::Pressed,
            },
            _ => InputEvent::Other,
        }
    }

    pub fn from_device_event(ev: &DeviceEvent) -> Self {
        match ev {
            DeviceEvent::MouseMotion { delta: (dx, dy) } => {
                InputEvent::MouseMove { dx: *dx as f32, dy: *dy as f32 }
            }
            _ => InputEvent::Other,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use winit::keyboard::SmolStr;

    fn key(ch: &str, pressed: bool) -> InputEvent {
        InputEvent::Key { key: Key::Character(SmolStr::new(ch)), pressed }
    }

    #[test]
    fn held_keys_drive_freefly_axes() {
        let mut input = Input::new();
        input.push(key("w", true));
        input.push(key("d", true));
        let axes = input.freefly_input().movement;
        assert_eq!(axes, Vec3::new(1.0, 0.0, 1.0));
        input.push(key("w", false));
        assert_eq!(input.freefly_input().movement, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn mouse_look_requires_right_button() {
        let mut input = Input::new();
        input.push(InputEvent::MouseMove { dx: 4.0, dy: -2.0 });
        assert_eq!(input.freefly_input().look, Vec2::ZERO);
        input.push(InputEvent::MouseButton { button: MouseButton::Right, pressed: true });
        assert_eq!(input.freefly_input().look, Vec2::new(4.0, -2.0));
        input.clear_frame();
        assert_eq!(input.freefly_input().look, Vec2::ZERO);
    }

    #[test]
    fn discrete_actions_trigger_on_press_only() {
        let mut input = Input::new();
        input.push(key("3", true));
        input.push(key("3", false));
        input.push(key("=", true));
        assert_eq!(input.take_triggered(), vec![InputAction::ShowPrefiltered, InputAction::SamplesUp]);
        assert!(input.take_triggered().is_empty());
    }

    #[test]
    fn bindings_file_overrides_defaults() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("input.json");
        fs::write(
            &path,
            r#"{ "bindings": { "toggle_debug_overlay": ["o"], "quit": ["bogus-key"], "nope": ["x"] } }"#,
        )
        .expect("write bindings");
        let mut input = Input::from_config(&path);
        input.push(key("o", true));
        input.push(key("k", true));
        input.push(InputEvent::Key { key: Key::Named(NamedKey::Escape), pressed: true });
        assert_eq!(input.take_triggered(), vec![InputAction::ToggleDebugOverlay, InputAction::Quit]);
    }
}
