//! Language table shared by the capture client and the translation prompt.

pub struct LanguageOption {
    pub code: &'static str,
    pub name: &'static str,
}

pub const LANGUAGES: &[LanguageOption] = &[
    LanguageOption {
        code: "default",
        name: "Default (Auto-detect)",
    },
    LanguageOption {
        code: "en",
        name: "English",
    },
    LanguageOption {
        code: "zh",
        name: "中文 (Chinese, Mandarin)",
    },
    LanguageOption {
        code: "es",
        name: "Español (Spanish)",
    },
    LanguageOption {
        code: "de",
        name: "Deutsch (German)",
    },
    LanguageOption {
        code: "fr",
        name: "Français (French)",
    },
    LanguageOption {
        code: "ja",
        name: "日本語 (Japanese)",
    },
    LanguageOption {
        code: "pt",
        name: "Português (Portuguese)",
    },
    LanguageOption {
        code: "ru",
        name: "Русский (Russian)",
    },
    LanguageOption {
        code: "ar",
        name: "العربية (Arabic)",
    },
    LanguageOption {
        code: "it",
        name: "Italiano (Italian)",
    },
    LanguageOption {
        code: "ko",
        name: "한국어 (Korean)",
    },
    LanguageOption {
        code: "hi",
        name: "हिन्दी (Hindi)",
    },
    LanguageOption {
        code: "nl",
        name: "Nederlands (Dutch)",
    },
    LanguageOption {
        code: "tr",
        name: "Türkçe (Turkish)",
    },
    LanguageOption {
        code: "pl",
        name: "Polski (Polish)",
    },
    LanguageOption {
        code: "id",
        name: "Bahasa Indonesia (Indonesian)",
    },
    LanguageOption {
        code: "th",
        name: "ภาษาไทย (Thai)",
    },
    LanguageOption {
        code: "sv",
        name: "Svenska (Swedish)",
    },
    LanguageOption {
        code: "he",
        name: "עברית (Hebrew)",
    },
    LanguageOption {
        code: "cs",
        name: "Čeština (Czech)",
    },
];

/// Display name for a language code; unknown codes pass through so the
/// translation prompt still names *something* sensible.
pub fn language_name(code: &str) -> &str {
    LANGUAGES
        .iter()
        .find(|option| option.code == code)
        .map(|option| option.name)
        .unwrap_or(code)
}

/// Treat empty strings and the auto-detect sentinel as "no language".
pub fn normalize_code(value: Option<&str>) -> Option<String> {
    match value {
        None => None,
        Some(code) if code.is_empty() || code == "default" => None,
        Some(code) => Some(code.to_string()),
    }
}
