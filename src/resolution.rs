/// Outcome of comparing a source height with a requested target height.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScaleDecision {
    /// Source height could not be detected.
    UnknownSource,
    /// Target is taller than the source; converting would upscale.
    SkipUpscale { source: u32, target: u32 },
    /// Source is already at the target height.
    SkipEqual { height: u32 },
    /// Downscale from `from` to `to`.
    Scale { from: u32, to: u32 },
}

/// Decide whether to re-encode a video to `target` pixels high. Never upscales.
pub fn decide_scale(source_height: Option<u32>, target: u32) -> ScaleDecision {
    match source_height.filter(|h| *h > 0) {
        None => ScaleDecision::UnknownSource,
        Some(source) if target > source => ScaleDecision::SkipUpscale { source, target },
        Some(source) if target == source => ScaleDecision::SkipEqual { height: source },
        Some(source) => ScaleDecision::Scale {
            from: source,
            to: target,
        },
    }
}
