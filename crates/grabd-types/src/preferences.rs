//! Session context forwarded from the console user's session to device grabbers.

/// Snapshot of the system preferences that influence event synthesis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SystemPreferences {
    /// Whether the top-row keys act as function keys by default.
    pub keyboard_fn_state: bool,
    /// Whether "natural" scroll direction is enabled.
    pub swipe_scroll_direction_natural: bool,
    /// Platform keyboard layout type (ANSI/ISO/JIS code).
    pub keyboard_type: u32,
}

/// The application currently in front.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct FrontmostApplication {
    pub bundle_identifier: String,
    pub file_path: String,
}

/// Identifiers of the active keyboard input source.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InputSourceIdentifiers {
    pub language: String,
    pub input_source_id: String,
    pub input_mode_id: String,
}
