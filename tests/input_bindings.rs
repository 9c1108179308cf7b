use runtime_ibl::input::{Input, InputAction, InputEvent};
use std::io::Write;
use tempfile::NamedTempFile;
use winit::keyboard::{Key, NamedKey};

#[test]
fn remapped_display_controls_override_defaults() {
    let mut temp = NamedTempFile::new().expect("temp input config");
    write!(temp, r#"{{"bindings":{{"show_irradiance":["i"],"toggle_debug_overlay":["tab"]}}}}"#)
        .expect("write remap config");

    let mut input = Input::from_config(temp.path());
    assert!(input.take_triggered().is_empty(), "no events yet");

    input.push(InputEvent::Key { key: Key::Character("i".into()), pressed: true });
    assert_eq!(input.take_triggered(), vec![InputAction::ShowIrradiance], "custom key selects irradiance");

    input.push(InputEvent::Key { key: Key::Character("2".into()), pressed: true });
    assert!(input.take_triggered().is_empty(), "default key no longer fires once remapped");

    input.push(InputEvent::Key { key: Key::Named(NamedKey::Tab), pressed: true });
    let actions = input.take_triggered();
    assert!(actions.contains(&InputAction::ToggleDebugOverlay), "tab toggles the overlay");

    input.push(InputEvent::Key { key: Key::Character("=".into()), pressed: true });
    assert_eq!(input.take_triggered(), vec![InputAction::SamplesUp], "untouched bindings keep defaults");
}

#[test]
fn shipped_bindings_file_parses() {
    let mut input = Input::from_config("config/input.json");
    input.push(InputEvent::Key { key: Key::Named(NamedKey::Escape), pressed: true });
    assert_eq!(input.take_triggered(), vec![InputAction::Quit]);
}
