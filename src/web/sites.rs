//! Per-site selectors for driving web generators.
//!
//! Each profile says where to type the prompt, which button starts the job,
//! where results appear and which `src` values count as generated output.
use crate::generation::types::MediaKind;
use crate::web::driver::Locator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SiteKind {
    LmArena,
    HuggingFace,
    Replicate,
    Generic,
}

#[derive(Debug, Clone, Copy)]
pub struct SiteProfile {
    pub kind: SiteKind,
    pub inputs: &'static [&'static str],
    pub buttons: &'static [&'static str],
    /// How many of the newest matching result elements to inspect.
    pub newest: usize,
}

const GENERIC_INPUTS: &[&str] = &["textarea", "input[type=\"text\"]", "[contenteditable=\"true\"]"];
const GENERIC_BUTTONS: &[&str] = &[
    "//button[contains(normalize-space(.), 'Generate')]",
    "//button[contains(normalize-space(.), 'Submit')]",
    "//button[contains(normalize-space(.), 'Create')]",
    "//button[contains(normalize-space(.), 'Run')]",
    "//button[@type='submit']",
];

impl SiteProfile {
    pub fn for_url(url: &str) -> Self {
        let kind = if url.contains("lmarena.ai") {
            SiteKind::LmArena
        } else if url.contains("huggingface.co") || url.contains(".hf.space") {
            SiteKind::HuggingFace
        } else if url.contains("replicate.com") {
            SiteKind::Replicate
        } else {
            SiteKind::Generic
        };
        Self::for_kind(kind)
    }

    pub fn for_kind(kind: SiteKind) -> Self {
        match kind {
            SiteKind::LmArena => SiteProfile {
                kind,
                inputs: &["textarea"],
                buttons: &[
                    "//button[contains(normalize-space(.), 'Generate')]",
                    "//button[contains(normalize-space(.), 'Submit')]",
                    "//button[contains(normalize-space(.), 'Create')]",
                    "//button[@type='submit']",
                ],
                newest: 3,
            },
            SiteKind::HuggingFace => SiteProfile {
                kind,
                inputs: &[".gradio-container textarea", "textarea", "input[type=\"text\"]"],
                buttons: &[
                    "//button[contains(normalize-space(.), 'Submit')]",
                    "//button[contains(normalize-space(.), 'Generate')]",
                ],
                newest: 2,
            },
            SiteKind::Replicate => SiteProfile {
                kind,
                inputs: &["textarea", "input[type=\"text\"]"],
                buttons: &["//button[contains(normalize-space(.), 'Run')]", "//button[@type='submit']"],
                newest: 3,
            },
            SiteKind::Generic => SiteProfile { kind, inputs: GENERIC_INPUTS, buttons: GENERIC_BUTTONS, newest: 3 },
        }
    }

    pub fn input_locators(&self) -> impl Iterator<Item = Locator<'static>> + '_ {
        self.inputs.iter().copied().map(Locator::Css)
    }

    pub fn button_locators(&self) -> impl Iterator<Item = Locator<'static>> + '_ {
        self.buttons.iter().copied().map(Locator::XPath)
    }

    pub fn result_locator(&self, kind: MediaKind) -> Locator<'static> {
        match kind {
            MediaKind::Image => Locator::Css("img"),
            MediaKind::Video => Locator::Css("video, video source"),
        }
    }

    /// Whether a result element's `src` looks like generated output for this site.
    pub fn accepts_src(&self, src: &str) -> bool {
        if src.is_empty() || src.starts_with("data:image/svg") {
            return false;
        }
        match self.kind {
            SiteKind::LmArena => src.starts_with("blob:") || src.starts_with("data:") || src.contains("generated"),
            SiteKind::Replicate => src.contains("replicate"),
            SiteKind::HuggingFace | SiteKind::Generic => true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_is_chosen_from_url() {
        assert_eq!(SiteProfile::for_url("https://lmarena.ai/?mode=direct").kind, SiteKind::LmArena);
        assert_eq!(SiteProfile::for_url("https://huggingface.co/spaces/x/y").kind, SiteKind::HuggingFace);
        assert_eq!(SiteProfile::for_url("https://replicate.com/explore").kind, SiteKind::Replicate);
        assert_eq!(SiteProfile::for_url("http://127.0.0.1:7860").kind, SiteKind::Generic);
    }

    #[test]
    fn src_filters_skip_icons_and_foreign_assets() {
        let arena = SiteProfile::for_kind(SiteKind::LmArena);
        assert!(arena.accepts_src("blob:https://lmarena.ai/1234"));
        assert!(!arena.accepts_src("https://lmarena.ai/logo.png"));
        assert!(!arena.accepts_src("data:image/svg+xml;base64,AAAA"));

        let replicate = SiteProfile::for_kind(SiteKind::Replicate);
        assert!(replicate.accepts_src("https://replicate.delivery/pbxt/out.png"));
        assert!(!replicate.accepts_src("https://cdn.example.com/out.png"));
    }
}
