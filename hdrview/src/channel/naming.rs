//! Channel name parsing.
//!
//! Channel names are `.`-separated paths. Everything before the last `.` is
//! the layer (the "head"), the remainder is the local channel name (the
//! "tail"). Channels without a `.` belong to the root layer `""`.

use crate::color::Rgba;

/// Splits a channel name at its last `.` into `(head, tail)`.
///
/// # Example
///
/// ```
/// use hdrview::channel::split;
///
/// assert_eq!(split("diffuse.R"), ("diffuse", "R"));
/// assert_eq!(split("a.b.Z"), ("a.b", "Z"));
/// assert_eq!(split("Y"), ("", "Y"));
/// ```
pub fn split(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(dot) => (&name[..dot], &name[dot + 1..]),
        None => ("", name),
    }
}

/// The layer part of a channel name (empty for the root layer).
pub fn head(name: &str) -> &str {
    split(name).0
}

/// The local part of a channel name.
pub fn tail(name: &str) -> &str {
    split(name).1
}

/// True if the channel lives in the root layer.
pub fn is_topmost(name: &str) -> bool {
    !name.contains('.')
}

/// Joins a layer and a local channel name.
pub fn join(layer: &str, local: &str) -> String {
    if layer.is_empty() {
        local.to_string()
    } else {
        format!("{}.{}", layer, local)
    }
}

/// Name of a layer's alpha channel (`<layer>.A`, or `A` for the root).
pub fn alpha_name(layer: &str) -> String {
    join(layer, "A")
}

/// UI color used to tint a channel's label.
pub fn color(name: &str) -> Rgba {
    match tail(name).to_lowercase().as_str() {
        "r" => Rgba::new(0.8, 0.2, 0.2, 1.0),
        "g" => Rgba::new(0.2, 0.8, 0.2, 1.0),
        "b" => Rgba::new(0.2, 0.3, 1.0, 1.0),
        _ => Rgba::WHITE,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_edge_cases() {
        assert_eq!(split(""), ("", ""));
        assert_eq!(split("."), ("", ""));
        assert_eq!(split("layer."), ("layer", ""));
        assert_eq!(split(".R"), ("", "R"));
    }

    #[test]
    fn test_head_tail() {
        assert_eq!(head("beauty.diffuse.G"), "beauty.diffuse");
        assert_eq!(tail("beauty.diffuse.G"), "G");
        assert_eq!(head("G"), "");
    }

    #[test]
    fn test_is_topmost() {
        assert!(is_topmost("R"));
        assert!(!is_topmost("diffuse.R"));
    }

    #[test]
    fn test_join_and_alpha() {
        assert_eq!(join("", "R"), "R");
        assert_eq!(join("spec", "R"), "spec.R");
        assert_eq!(alpha_name(""), "A");
        assert_eq!(alpha_name("spec"), "spec.A");
    }

    #[test]
    fn test_color_uses_lowercase_tail() {
        assert_eq!(color("diffuse.R"), Rgba::new(0.8, 0.2, 0.2, 1.0));
        assert_eq!(color("g"), Rgba::new(0.2, 0.8, 0.2, 1.0));
        assert_eq!(color("x.B"), Rgba::new(0.2, 0.3, 1.0, 1.0));
        assert_eq!(color("R.depth"), Rgba::WHITE);
        assert_eq!(color("A"), Rgba::WHITE);
    }
}
