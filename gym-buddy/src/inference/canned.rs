//! Offline coach used when no inference credentials are configured.
//!
//! Picks a canned tip by keyword from the latest client message, otherwise an
//! encouragement mentioning the current exercise.

use async_trait::async_trait;
use rand::seq::IndexedRandom;

use super::{InferenceError, InferenceProvider, InferenceRequest};

const FORM_TIPS: &[&str] = &[
    "Great question! For proper form, focus on: 1) Full range of motion, 2) Controlled movements, 3) Engaging the target muscle. Avoid momentum and jerky movements.",
    "Form tips: Keep your core tight, maintain neutral spine, and move deliberately. Quality over quantity every time! 💪",
];

const MOTIVATION_TIPS: &[&str] = &[
    "You got this! Remember why you started. Every rep counts and you're getting stronger every day! 🔥",
    "Let's go! You're crushing it! Push through those last reps, that's where the gains happen!",
];

const WEIGHT_TIPS: &[&str] = &[
    "Progressive overload is key! Increase weight by 5-10% when you can do all sets/reps with good form. Don't rush it.",
    "Focus on perfecting form first, then gradually increase weight. Slow and steady wins the gains race!",
];

const REST_TIPS: &[&str] = &[
    "Rest is when muscles grow! Aim for 48 hours between training the same muscle groups. Sleep 7-9 hours for recovery.",
    "Recovery matters: 60-90 seconds between sets for strength, 30-45 seconds for hypertrophy. Don't skip rest days!",
];

const NUTRITION_TIPS: &[&str] = &[
    "Fuel your gains! Eat 0.7-1g protein per pound of body weight daily. Don't forget carbs and healthy fats too.",
    "Post-workout nutrition is crucial. Get protein and carbs within 2 hours of training for optimal recovery.",
];

/// Keyword table, checked in order.
pub const KEYWORD_TIPS: &[(&str, &[&str])] = &[
    ("form", FORM_TIPS),
    ("motivation", MOTIVATION_TIPS),
    ("weight", WEIGHT_TIPS),
    ("rest", REST_TIPS),
    ("nutrition", NUTRITION_TIPS),
];

#[derive(Debug, Clone, Copy, Default)]
pub struct CannedCoachProvider;

impl CannedCoachProvider {
    /// Every reply the provider may give for this message.
    pub fn candidates(exercise: &str, user_text: &str) -> Vec<String> {
        let lower = user_text.to_lowercase();
        if let Some((_, tips)) = KEYWORD_TIPS.iter().find(|(keyword, _)| lower.contains(keyword)) {
            return tips.iter().map(|tip| tip.to_string()).collect();
        }
        vec![
            format!("Nice! Keep crushing your {exercise} workout! Focus on form and consistency. 💪"),
            format!("That's awesome dedication to {exercise}! You're building strength and discipline. Keep it up!"),
            format!("{exercise} is an excellent choice! Stay focused, controlled movements, and you'll see great results!"),
        ]
    }
}

#[async_trait]
impl InferenceProvider for CannedCoachProvider {
    fn name(&self) -> &str {
        "canned"
    }

    async fn run(
        &self,
        _model: &str,
        request: &InferenceRequest,
    ) -> Result<serde_json::Value, InferenceError> {
        let candidates =
            Self::candidates(&request.context.exercise, &request.context.user_text);
        let reply = candidates
            .choose(&mut rand::rng())
            .cloned()
            .ok_or_else(|| InferenceError::Provider("no canned replies".to_string()))?;
        Ok(serde_json::json!({ "response": reply }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::inference::{reply_text, CoachingContext};

    fn request(exercise: &str, user_text: &str) -> InferenceRequest {
        InferenceRequest {
            prompt: String::new(),
            max_tokens: 150,
            temperature: 0.7,
            context: CoachingContext {
                exercise: exercise.to_string(),
                user_text: user_text.to_string(),
            },
        }
    }

    #[test]
    fn test_keyword_match_is_case_insensitive() {
        let candidates = CannedCoachProvider::candidates("squats", "How is my FORM?");
        assert_eq!(candidates.len(), FORM_TIPS.len());
        assert!(candidates[0].contains("proper form"));
    }

    #[test]
    fn test_first_keyword_in_table_wins() {
        // "form" is listed before "rest"
        let candidates = CannedCoachProvider::candidates("squats", "rest and form");
        assert!(candidates.iter().all(|c| FORM_TIPS.contains(&c.as_str())));
    }

    #[test]
    fn test_default_replies_mention_exercise() {
        let candidates = CannedCoachProvider::candidates("rowing", "hello coach");
        assert_eq!(candidates.len(), 3);
        assert!(candidates.iter().all(|c| c.contains("rowing")));
    }

    #[tokio::test]
    async fn test_run_returns_one_of_the_candidates() {
        let provider = CannedCoachProvider;
        let result = provider.run("any", &request("deadlift", "need motivation")).await.unwrap();
        let reply = reply_text(&result);
        assert!(MOTIVATION_TIPS.contains(&reply.as_str()));
    }
}
