//! Keyword intent heuristics
//!
//! Both classifiers are deterministic substring checks over the lower-cased
//! text. Keyword lists and weights are part of the observable behaviour.

use serde::{Deserialize, Serialize};

use crate::context::UserIntent;

const SEARCH_KEYWORDS: &[&str] = &["open", "load", "show me", "find"];
const MODIFY_KEYWORDS: &[&str] = &["change", "modify", "update", "fix"];
const CREATE_KEYWORDS: &[&str] = &["create", "make", "build", "generate"];

const MODIFICATION_KEYWORDS: &[&str] = &[
    "change", "modify", "update", "edit", "fix", "adjust", "add", "remove", "delete", "improve",
    "tweak", "alter", "revise", "replace", "rename", "enhance",
];
const THEME_KEYWORDS: &[&str] = &[
    "theme",
    "color",
    "colour",
    "style",
    "dark mode",
    "light mode",
    "font",
    "background",
    "layout",
];

const APPLET_LOADED_WEIGHT: f64 = 0.5;
const MODIFICATION_KEYWORD_WEIGHT: f64 = 0.2;
const THEME_KEYWORD_WEIGHT: f64 = 0.15;

/// How a modification was recognized.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DetectionMethod {
    /// Text keywords only.
    Nlp,
    /// An artifact is loaded and the text gave no further signal.
    AppletLoaded,
    /// An artifact is loaded and the text matched keywords.
    Both,
}

/// Outcome of [`detect_modification_intent`].
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct ModificationDetection {
    pub is_modification: bool,
    /// Additive score clamped to `[0, 1]`.
    pub confidence: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_applet: Option<String>,
    pub detection_method: DetectionMethod,
    pub match_reasons: Vec<String>,
}

/// Classify a request as search, modify or create, in that priority order.
pub fn analyze_user_intent(text: &str) -> UserIntent {
    let lowered = text.to_lowercase();

    if find_keyword(&lowered, SEARCH_KEYWORDS).is_some() {
        UserIntent::Search
    } else if find_keyword(&lowered, MODIFY_KEYWORDS).is_some() {
        UserIntent::Modify
    } else if find_keyword(&lowered, CREATE_KEYWORDS).is_some() {
        UserIntent::Create
    } else {
        UserIntent::Unknown
    }
}

/// Score whether `text` targets an existing artifact.
pub fn detect_modification_intent(
    text: &str,
    current_applet_id: Option<&str>,
) -> ModificationDetection {
    let lowered = text.to_lowercase();
    let mut detection = ModificationDetection {
        is_modification: false,
        confidence: 0.0,
        current_applet: current_applet_id.map(str::to_string),
        detection_method: DetectionMethod::Nlp,
        match_reasons: Vec::new(),
    };
    let applet_loaded = current_applet_id.is_some();

    if let Some(applet_id) = current_applet_id {
        detection.is_modification = true;
        detection.confidence += APPLET_LOADED_WEIGHT;
        detection
            .match_reasons
            .push(format!("applet {} is currently loaded", applet_id));
        detection.detection_method = DetectionMethod::AppletLoaded;
    }

    if let Some(keyword) = find_keyword(&lowered, MODIFICATION_KEYWORDS) {
        detection.is_modification = true;
        detection.confidence += MODIFICATION_KEYWORD_WEIGHT;
        detection
            .match_reasons
            .push(format!("modification keyword \"{}\"", keyword));
        if applet_loaded {
            detection.detection_method = DetectionMethod::Both;
        }
    }

    if let Some(keyword) = find_keyword(&lowered, THEME_KEYWORDS) {
        detection.is_modification = true;
        detection.confidence += THEME_KEYWORD_WEIGHT;
        detection
            .match_reasons
            .push(format!("theme keyword \"{}\"", keyword));
        if applet_loaded {
            detection.detection_method = DetectionMethod::Both;
        }
    }

    detection.confidence = detection.confidence.clamp(0.0, 1.0);
    detection
}

fn find_keyword(lowered: &str, keywords: &[&'static str]) -> Option<&'static str> {
    keywords
        .iter()
        .copied()
        .find(|keyword| lowered.contains(keyword))
}
