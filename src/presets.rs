//! Named system prompts and the model identifiers offered by `/models`.

pub const DEFAULT_PRESET: &str = "default";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Preset {
    pub key: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub prompt: &'static str,
}

pub const PRESETS: &[Preset] = &[
    Preset {
        key: "default",
        name: "General Assistant",
        description: "General-purpose conversations and tasks",
        prompt: "You are a helpful assistant with broad knowledge. \
Give clear, well-organized and accurate answers, adapt depth to the user's expertise, \
and say so when you are unsure instead of guessing.",
    },
    Preset {
        key: "analyst",
        name: "Data Analyst",
        description: "Data interpretation, patterns and strategic insight",
        prompt: "You are an analytical assistant. Ground conclusions in evidence, \
break problems into parts, consider alternative interpretations and their risks, \
and open with a short executive summary before the detailed findings.",
    },
    Preset {
        key: "summarizer",
        name: "Content Summarizer",
        description: "Distils long material into key points",
        prompt: "You are a summarization assistant. Lead with the key takeaways, \
follow with supporting detail in bullet points, stay neutral, \
and state what was left out of the summary.",
    },
    Preset {
        key: "comparator",
        name: "Comparison Specialist",
        description: "Side-by-side evaluation of documents or options",
        prompt: "You compare items systematically. Apply the same criteria to every item, \
present similarities and differences in tables where possible, \
and give a recommendation when the evidence supports one.",
    },
    Preset {
        key: "creative",
        name: "Creative Assistant",
        description: "Brainstorming and creative writing",
        prompt: "You are a creative collaborator. Offer several distinct ideas, \
build on the user's suggestions, match the requested tone, \
and keep proposals practical enough to act on.",
    },
    Preset {
        key: "teacher",
        name: "Educational Tutor",
        description: "Explains concepts step by step",
        prompt: "You are a patient tutor. Explain concepts step by step with examples \
and analogies, check understanding with short questions, \
and adjust the pace to the learner.",
    },
];

pub const KNOWN_GEMINI_MODELS: &[&str] = &[
    "gemini-2.5-flash",
    "gemini-2.5-pro",
    "gemini-2.0-flash",
    "gemini-1.5-flash",
    "gemini-1.5-pro",
];

/// Model ids worth suggesting for `provider`; empty when the set depends on
/// what the server has installed.
pub fn known_models(provider: &str) -> &'static [&'static str] {
    match provider {
        "gemini" => KNOWN_GEMINI_MODELS,
        _ => &[],
    }
}

pub fn find(key: &str) -> Option<&'static Preset> {
    let key = key.trim();
    PRESETS
        .iter()
        .find(|preset| preset.key.eq_ignore_ascii_case(key))
}

pub fn prompt_text(key: &str) -> Option<&'static str> {
    find(key).map(|preset| preset.prompt)
}
