//! Shared pitch-class naming, fixed across the crate at C = 0.

/// Pitch-class names, index 0 = C through index 11 = B.
pub const PITCH_NAMES: [&str; 12] = [
    "C", "C#", "D", "D#", "E", "F", "F#", "G", "G#", "A", "A#", "B",
];

/// Returns the pitch-class name for `index mod 12`.
pub fn pitch_name(index: i32) -> &'static str {
    PITCH_NAMES[index.rem_euclid(12) as usize]
}

/// Parses a pitch-class name (e.g. `"C#"`, `"Db"`) into its 0..11 index.
/// Returns `None` for anything not recognized.
pub fn pitch_index(name: &str) -> Option<i32> {
    let flats = [
        "C", "Db", "D", "Eb", "E", "F", "Gb", "G", "Ab", "A", "Bb", "B",
    ];
    if let Some(i) = PITCH_NAMES.iter().position(|&n| n == name) {
        return Some(i as i32);
    }
    flats.iter().position(|&n| n == name).map(|i| i as i32)
}
