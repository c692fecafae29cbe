//! Attempt-tracking decision table and feedback prompt templates.
//!
//! The tutoring loop is a static mapping from a 0-based attempt count to a
//! prompt-template instruction, plus one short-circuit: a learner answer
//! close enough to the golden answer never reaches the language model.

use crate::similarity::{normalize, ratio};

/// Canned reply for the similarity short-circuit.
pub const CORRECT_MOVE_ON_MESSAGE: &str = "That's right! Your explanation covers the key ideas \
of this concept. You've completed the self-explanation for this concept, so please move on to \
the next one.";

/// Returned when feedback is requested before any concept context is set.
pub const MISSING_CONTEXT_MESSAGE: &str = "As your tutor, I'm not able to provide you with \
feedback without having context about your explanation. Please ensure the context is set.";

/// Where the learner is in the per-concept attempt sequence (0-based count
/// at submission time).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptStage {
    /// Attempt 0 — general feedback plus a broad hint if incorrect.
    First,
    /// Attempt 1 — more specific feedback naming missing elements.
    Second,
    /// Attempt 2 — reveal the correct explanation if still incorrect.
    Third,
    /// Attempt 3 and beyond — tell the learner to move on regardless.
    MoveOn,
}

impl AttemptStage {
    pub fn from_attempt(attempt: u32) -> Self {
        match attempt {
            0 => Self::First,
            1 => Self::Second,
            2 => Self::Third,
            _ => Self::MoveOn,
        }
    }

    fn instruction(&self) -> &'static str {
        match self {
            Self::First => {
                "If the explanation is correct, communicate this to the user. If it is not \
                 correct, provide general feedback and a broad hint to guide the user."
            }
            Self::Second => {
                "If the explanation is correct, communicate this to the user. If it is not \
                 correct, provide more specific feedback and highlight key elements the user \
                 missed."
            }
            Self::Third => {
                "If the explanation is correct, communicate this to the user. If it is not \
                 correct, provide the correct explanation, as the user has made multiple attempts."
            }
            Self::MoveOn => {
                "Let the user know they have completed three self-explanation attempts. Instruct \
                 them to stop here and tell them to continue with the next concept."
            }
        }
    }
}

/// System + user message pair for the chat completions call.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedbackPrompt {
    pub system: String,
    pub user: String,
}

impl FeedbackPrompt {
    pub fn build(concept_name: &str, golden_answer: &str, learner_text: &str, attempt: u32) -> Self {
        let stage = AttemptStage::from_attempt(attempt);

        let system = format!(
            "Context: {concept_name}\n\
             Golden Answer: {golden_answer}\n\
             User Explanation: {learner_text}\n\
             \n\
             You are a friendly and encouraging tutor, helping a student refine their \
             understanding of a concept in a supportive way. Your goal is to evaluate the \
             student's explanation of this concept and provide warm, engaging feedback:\n\
             - If the user's explanation includes all the relevant aspects of the golden answer, \
             celebrate their effort and reinforce their confidence. Inform them that their \
             explanation is correct and they have completed the self-explanation for this \
             concept. Instruct them to proceed to the next concept.\n\
             - If the explanation is partially correct, acknowledge their progress and gently \
             guide them toward refining their answer.\n\
             - If it's incorrect, provide constructive and positive feedback without discouraging \
             them. Offer hints and encouragement.\n\
             - Do not provide the golden answer or parts of it directly. Instead, guide the user \
             to arrive at it themselves.\n\
             Use a conversational tone, making the user feel comfortable and motivated to keep \
             trying but refrain from using emojis in the text.\n\
             Ignore any emojis that are part of the user's explanation.\n\
             If the user is not talking about the current concept, guide them back to the task of \
             self-explaining the current concept."
        );

        let user = format!("User Explanation: {learner_text}\n\n{}", stage.instruction());

        Self { system, user }
    }
}

/// The short-circuit: normalized similarity between the learner's text and
/// the golden answer at or above `threshold` means "correct, move on"
/// without any model call.
pub fn matches_golden_answer(learner_text: &str, golden_answer: &str, threshold: f64) -> bool {
    ratio(&normalize(learner_text), &normalize(golden_answer)) >= threshold
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_table() {
        assert_eq!(AttemptStage::from_attempt(0), AttemptStage::First);
        assert_eq!(AttemptStage::from_attempt(1), AttemptStage::Second);
        assert_eq!(AttemptStage::from_attempt(2), AttemptStage::Third);
        assert_eq!(AttemptStage::from_attempt(3), AttemptStage::MoveOn);
        assert_eq!(AttemptStage::from_attempt(17), AttemptStage::MoveOn);
    }

    #[test]
    fn test_prompt_embeds_context_and_stage() {
        let p = FeedbackPrompt::build("Confounders", "the golden text", "my try", 1);
        assert!(p.system.contains("Context: Confounders"));
        assert!(p.system.contains("Golden Answer: the golden text"));
        assert!(p.user.contains("User Explanation: my try"));
        assert!(p.user.contains("more specific feedback"));
    }

    #[test]
    fn test_prompt_move_on_after_three_attempts() {
        let p = FeedbackPrompt::build("Correlation", "g", "u", 3);
        assert!(p.user.contains("completed three self-explanation attempts"));
    }

    #[test]
    fn test_golden_match_ignores_case_and_punctuation() {
        let golden = "Correlation does not imply causation.";
        assert!(matches_golden_answer("correlation does NOT imply causation!!", golden, 0.8));
    }

    #[test]
    fn test_golden_match_rejects_unrelated() {
        let golden = "Correlation does not imply causation.";
        assert!(!matches_golden_answer("bananas are yellow", golden, 0.8));
    }

    #[test]
    fn test_exact_golden_answer_matches_at_any_reasonable_threshold() {
        let golden = "A moderator affects the strength or direction of a relationship.";
        assert!(matches_golden_answer(golden, golden, 0.999));
    }
}
