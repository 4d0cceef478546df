//! Multimodal-rejection classifier

/// Substrings that mark a provider error as a multimodal rejection.
const MULTIMODAL_MARKERS: &[&str] = &[
    "vision",
    "image",
    "multimodal",
    "unsupported",
    "image_url",
    "400",
    "invalid",
    "not supported",
];

/// Decide whether a provider error message looks like a rejection of
/// multimodal input, making the request eligible for one text-only retry.
///
/// Matching is case-insensitive substring search and deliberately
/// permissive: a false positive costs one harmless extra retry, while a
/// false negative costs a user-visible failure that could have been
/// recovered. Do not tighten the vocabulary without data on real provider
/// error texts.
pub fn is_multimodal_rejection(message: &str) -> bool {
    let message = message.to_lowercase();
    MULTIMODAL_MARKERS
        .iter()
        .any(|marker| message.contains(marker))
}
