//! Channel group inference.
//!
//! Decides which channels of a layer form displayable RGBA combinations.
//! Canonical tuples are tried in a fixed order; whatever is left becomes a
//! greyscale group of its own. The layer's alpha channel is appended to
//! every group.
//!
//! # Example
//!
//! ```
//! use hdrview::image::group_channels;
//!
//! let names = ["diffuse.B", "diffuse.R", "diffuse.A", "diffuse.G", "diffuse.Y"];
//! let groups = group_channels("diffuse", &names);
//!
//! assert_eq!(groups[0].name, "diffuse.(R,G,B,A)");
//! assert_eq!(groups[0].channels, ["diffuse.R", "diffuse.G", "diffuse.B", "diffuse.A"]);
//! assert_eq!(groups[1].name, "diffuse.(Y,A)");
//! ```

use crate::channel;

/// Canonical channel tuples, most preferred first.
const CANONICAL_TUPLES: &[&[&str]] = &[
    &["R", "G", "B"],
    &["r", "g", "b"],
    &["X", "Y", "Z"],
    &["x", "y", "z"],
    &["U", "V"],
    &["u", "v"],
    &["Z"],
    &["z"],
];

/// 1-4 channels that are displayed together.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelGroup {
    /// Display name, e.g. `R,G,B` or `diffuse.(R,G,B,A)`.
    pub name: String,
    /// Full channel names in RGBA order.
    pub channels: Vec<String>,
}

impl ChannelGroup {
    fn new(layer: &str, channels: Vec<String>) -> Self {
        let mut distinct = channels.clone();
        distinct.dedup();
        let tails: Vec<&str> = distinct.iter().map(|c| channel::tail(c)).collect();
        let joined = tails.join(",");

        let name = if layer.is_empty() {
            joined
        } else if tails.len() == 1 {
            format!("{}.{}", layer, joined)
        } else {
            format!("{}.({})", layer, joined)
        };

        Self { name, channels }
    }
}

/// Infers the channel groups of one layer.
///
/// `channels_in_layer` are the full names of the layer's channels. Every one
/// of them ends up in exactly one group; the alpha channel (`<layer>.A`) ends
/// up last in every group. The result is empty only if the input is.
pub fn group_channels<S: AsRef<str>>(layer: &str, channels_in_layer: &[S]) -> Vec<ChannelGroup> {
    let alpha = channel::alpha_name(layer);

    let mut remaining: Vec<&str> = channels_in_layer.iter().map(AsRef::as_ref).collect();
    let has_alpha = match remaining.iter().position(|&c| c == alpha) {
        Some(i) => {
            remaining.remove(i);
            true
        }
        None => false,
    };

    let finish = |mut members: Vec<String>| {
        if members.len() == 1 {
            members.push(members[0].clone());
            members.push(members[0].clone());
        }
        if has_alpha {
            members.push(alpha.clone());
        }
        ChannelGroup::new(layer, members)
    };

    let mut groups = Vec::new();

    for tuple in CANONICAL_TUPLES {
        let mut members = Vec::new();
        for local in tuple.iter() {
            let name = channel::join(layer, local);
            if let Some(i) = remaining.iter().position(|&c| c == name) {
                remaining.remove(i);
                members.push(name);
            }
        }
        if !members.is_empty() {
            groups.push(finish(members));
        }
    }

    for name in remaining {
        groups.push(finish(vec![name.to_string()]));
    }

    if has_alpha && groups.is_empty() {
        groups.push(ChannelGroup::new(
            layer,
            vec![alpha.clone(), alpha.clone(), alpha.clone()],
        ));
    }

    groups
}

/// Channels of a layer in group order, with the alpha channel listed once.
pub fn sorted_channels<S: AsRef<str>>(layer: &str, channels_in_layer: &[S]) -> Vec<String> {
    let alpha = channel::alpha_name(layer);
    let mut seen_alpha = false;
    let mut result = Vec::new();

    for group in group_channels(layer, channels_in_layer) {
        let mut previous: Option<String> = None;
        for name in group.channels {
            if name == alpha {
                if seen_alpha {
                    continue;
                }
                seen_alpha = true;
            }
            if previous.as_deref() == Some(name.as_str()) {
                continue;
            }
            previous = Some(name.clone());
            result.push(name);
        }
    }

    result
}
