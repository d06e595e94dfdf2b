use crate::core::models::TargetLanguage;

/// System instruction shared by token counting and generation
pub const TRANSLATION_SYSTEM_PROMPT: &str = "You are a professional translator. \
     Preserve technical accuracy, attend to idioms, and keep formatting aligned with the provided text.";

pub fn build_user_prompt(target_language: TargetLanguage, text: &str) -> String {
    format!(
        "Translate the following document into {}. Keep the tone neutral and describe cultural notes only when helpful:\n\n{}",
        target_language.label(),
        text
    )
}
