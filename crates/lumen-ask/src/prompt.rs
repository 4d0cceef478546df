//! Prompt mode classification and system prompt selection

use serde::{Deserialize, Serialize};

/// Marker glyphs that tag a question as coming from live insights.
const LIVE_INSIGHT_MARKERS: &[&str] = &["\u{2753}", "\u{2728}", "\u{1f4ac}", "\u{2709}\u{fe0f}", "\u{2705}", "\u{1f4dd}"];

/// How the incoming question should be prompted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptMode {
    /// The question is itself a pasted conversation to analyze
    ConversationAnalysis,
    /// The question references the live transcript
    TranscriptAnalysis,
    /// A regular question, persona-driven
    Standard,
}

/// Classify the incoming text into a prompt mode.
///
/// The ordering is a contract: conversation-text detection takes priority
/// over live-insight detection, which takes priority over the standard
/// path. Callers relying on marker-glyph detection must ensure their text
/// does not also satisfy the conversation-text predicate.
pub fn classify(question: &str, from_live_insights: bool) -> PromptMode {
    if is_conversation_text(question) {
        PromptMode::ConversationAnalysis
    } else if from_live_insights || has_live_insight_marker(question) {
        PromptMode::TranscriptAnalysis
    } else {
        PromptMode::Standard
    }
}

/// Conversation text carries speaker prefixes, or colon-delimited
/// multi-line structure.
fn is_conversation_text(question: &str) -> bool {
    question.contains("me:")
        || question.contains("them:")
        || question.contains("Me:")
        || question.contains("Them:")
        || (question.contains(':') && question.contains('\n'))
}

fn has_live_insight_marker(question: &str) -> bool {
    LIVE_INSIGHT_MARKERS
        .iter()
        .any(|marker| question.contains(marker))
}

/// Professional context injected ahead of standard prompts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CareerProfile {
    pub role: Option<String>,
    pub industry: Option<String>,
    pub experience: Option<String>,
    pub programming_language: Option<String>,
}

impl CareerProfile {
    fn context(&self) -> Option<String> {
        let mut parts = Vec::new();
        if let Some(ref industry) = self.industry {
            parts.push(format!("Industry: {}", industry));
        }
        if let Some(ref role) = self.role {
            parts.push(format!("Role: {}", role));
        }
        if let Some(ref experience) = self.experience {
            parts.push(format!("Experience: {}", experience));
        }
        if let Some(ref language) = self.programming_language {
            parts.push(format!("Programming Language: {}", language));
        }
        if parts.is_empty() {
            return None;
        }
        Some(format!(
            "**USER CONTEXT:**\n{}\n\nTailor your responses to this professional context.",
            parts.join(" | ")
        ))
    }
}

/// Build the system prompt for a classified request.
pub fn system_prompt(
    mode: PromptMode,
    question: &str,
    history: &str,
    persona: &str,
    from_camera: bool,
    career: Option<&CareerProfile>,
) -> String {
    match mode {
        PromptMode::ConversationAnalysis => conversation_analysis_prompt(question),
        PromptMode::TranscriptAnalysis => transcript_analysis_prompt(question, history),
        PromptMode::Standard => {
            let persona = if from_camera { "camera_analysis" } else { persona };
            let prompt = persona_prompt(persona, history);
            match career.and_then(CareerProfile::context) {
                Some(context) => format!("{}\n\n{}", context, prompt),
                None => prompt,
            }
        }
    }
}

fn conversation_analysis_prompt(question: &str) -> String {
    format!(
        "You are an analyst specializing in conversation analysis. Analyze the \
selected conversation text and answer directly, then elaborate. For coding \
questions, include working code with time and space complexity.

**CONVERSATION TEXT TO ANALYZE:**
{question}

**RESPONSE FORMAT:**
- Direct Answer: one clear sentence answering the main point
- Elaboration: detailed explanation and analysis
- Key Insights: what can be learned from this conversation"
    )
}

fn transcript_analysis_prompt(question: &str, history: &str) -> String {
    format!(
        "You are an analyst working from a live conversation transcript. Answer \
the question in a few sentences of plain spoken english, then elaborate. Base \
your response on the transcript below when it is relevant; if it is empty or \
unrelated and the question stands on its own, answer it directly and say so.

**CONVERSATION TRANSCRIPT:**
{history}

**USER QUESTION:**
{question}"
    )
}

/// Section-based persona templates, joined with the history injected as
/// user-provided context.
struct PersonaTemplate {
    intro: &'static str,
    format_requirements: &'static str,
    output_instructions: &'static str,
}

fn persona_template(persona: &str) -> PersonaTemplate {
    match persona {
        "camera_analysis" => PersonaTemplate {
            intro: "You are a screen analysis assistant. The user has captured \
their screen and wants help with what is visible on it.",
            format_requirements: "Describe what matters on the screen first, then \
answer the request. Reference visible elements concretely rather than \
guessing at what is off-screen.",
            output_instructions: "Keep the answer grounded in the capture; if the \
image does not show enough to answer, say what is missing.",
        },
        // Any unknown persona falls back to the default assistant.
        _ => PersonaTemplate {
            intro: "You are a desktop assistant. Answer the user's request \
directly and helpfully.",
            format_requirements: "Lead with the answer, then give supporting \
detail. Use markdown formatting; for code, include a fenced block with the \
language tag.",
            output_instructions: "Be concise. Do not restate the question or \
pad the answer with caveats the user did not ask for.",
        },
    }
}

fn persona_prompt(persona: &str, history: &str) -> String {
    let template = persona_template(persona);
    [
        template.intro,
        "\n\n",
        template.format_requirements,
        "\n\nUser-provided context\n-----\n",
        history,
        "\n-----\n\n",
        template.output_instructions,
    ]
    .concat()
}
