//! Outbound turn rendering.
//!
//! Every prompt the engines send is built here from the learner profile and
//! the data the current stage needs. Rendering is deterministic: the same
//! inputs always produce the same text.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::config::{ExperienceLevel, LearnerProfile, QuestionStyle};
use crate::parser::ExerciseSpec;
use crate::source::CodeUnit;

/// Placeholder sent in place of an answer the learner left blank.
pub const NO_ANSWER: &str = "(no answer given)";

// ============================================================================
// Difficulty
// ============================================================================

/// Difficulty tier of a teaching round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Difficulty {
    /// Round 1.
    Obvious,
    /// Rounds 2 and 3.
    Subtle,
    /// Round 4 onwards.
    Nuanced,
}

impl Difficulty {
    /// Maps a round number to its difficulty tier.
    ///
    /// Round 0 is treated as round 1.
    #[must_use]
    pub const fn for_round(round: u32) -> Self {
        match round {
            0 | 1 => Self::Obvious,
            2 | 3 => Self::Subtle,
            _ => Self::Nuanced,
        }
    }

    /// The phrase embedded in generation prompts.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Obvious => "obvious but instructive",
            Self::Subtle => "subtle and thought-provoking",
            Self::Nuanced => "nuanced, requiring deep understanding",
        }
    }
}

impl std::fmt::Display for Difficulty {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

const fn experience_guidance(level: ExperienceLevel) -> &'static str {
    match level {
        ExperienceLevel::Beginner => {
            "This programmer is still learning. Use plain language, explain concepts as you \
             introduce them and stay with fundamentals. Avoid jargon unless you define it."
        }
        ExperienceLevel::Intermediate => {
            "This programmer has some experience. Trade-offs and more advanced concepts are \
             fair game, as long as you give context."
        }
        ExperienceLevel::Advanced => {
            "This programmer is experienced. Concentrate on architecture, design patterns and \
             deeper implications. Advanced concepts need no introduction."
        }
        ExperienceLevel::Expert => {
            "This programmer is highly skilled. Engage in nuanced discussion of design \
             philosophy, performance implications and established practice."
        }
    }
}

const fn style_guidance(style: QuestionStyle) -> &'static str {
    match style {
        QuestionStyle::Socratic => {
            "Ask questions that lead the programmer to discover insights on their own."
        }
        QuestionStyle::Direct => "Ask straightforward, specific questions about the code.",
        QuestionStyle::Exploratory => {
            "Ask open-ended questions about alternatives and trade-offs."
        }
    }
}

/// Info string for a fenced code block: first word of the language, lowercased.
fn fence_tag(language: &str) -> String {
    match language.split_whitespace().next().unwrap_or_default().to_lowercase().as_str() {
        "c++" => "cpp".to_string(),
        "c#" => "csharp".to_string(),
        other => other.to_string(),
    }
}

// ============================================================================
// Prompt Builder
// ============================================================================

/// Renders outbound turns for one learner.
#[derive(Debug, Clone, Copy)]
pub struct PromptBuilder<'a> {
    profile: &'a LearnerProfile,
}

impl<'a> PromptBuilder<'a> {
    /// Creates a builder for the given learner.
    #[must_use]
    pub const fn new(profile: &'a LearnerProfile) -> Self {
        Self { profile }
    }

    fn focus_list(&self) -> String {
        self.profile
            .focus_areas()
            .iter()
            .map(|area| area.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// The first turn of a review: asks for clarifying questions and observations.
    #[must_use]
    pub fn initial_analysis(&self, code: &CodeUnit) -> String {
        let level = self.profile.experience_level();
        let style = self.profile.question_style();

        format!(
            "You are a respectful, thoughtful code tutor. Understand the programmer's code \
             before you judge it.\n\
             \n\
             Programmer profile:\n\
             - Experience level: {level}\n\
             - {experience}\n\
             - Focus areas: {focus}\n\
             - Question style: {style}\n\
             - {style_hint}\n\
             \n\
             File:\n\
             - Name: {name}\n\
             - Language: {language}\n\
             - Lines: {lines}\n\
             \n\
             Code to review:\n\
             ```{tag}\n\
             {content}\n\
             ```\n\
             \n\
             Your task:\n\
             1. Read the code carefully.\n\
             2. Ask 2-3 clarifying questions before judging anything: design decisions and \
             their rationale, intended use and constraints, choices that look deliberate.\n\
             3. Give brief initial observations (not criticism) about structure, notable \
             patterns and areas worth discussing.\n\
             \n\
             Format your response exactly like this:\n\
             \n\
             ## Questions\n\
             \n\
             1. [First question]\n\
             2. [Second question]\n\
             3. [Third question, if needed]\n\
             \n\
             ## Initial Observations\n\
             \n\
             - [Observation]\n\
             - [Observation]\n\
             \n\
             Assume good intentions and aim to understand first.",
            experience = experience_guidance(level),
            focus = self.focus_list(),
            style_hint = style_guidance(style),
            name = code.display_name(),
            language = code.language,
            lines = code.line_count,
            tag = fence_tag(&code.language),
            content = code.content.trim_end(),
        )
    }

    /// The feedback request: every question paired with the learner's answer.
    ///
    /// Blank answers are sent as [`NO_ANSWER`] so the pairs stay aligned.
    #[must_use]
    pub fn feedback_request(&self, questions: &[String], answers: &[String]) -> String {
        let level = self.profile.experience_level();

        let mut pairs = String::new();
        if questions.is_empty() {
            pairs.push_str(
                "No clarifying questions were needed. Base your feedback on the code alone.\n",
            );
        } else {
            for (i, question) in questions.iter().enumerate() {
                let answer = answers
                    .get(i)
                    .map(|a| a.trim())
                    .filter(|a| !a.is_empty())
                    .unwrap_or(NO_ANSWER);
                let n = i + 1;
                let _ = write!(pairs, "Question {n}: {question}\nAnswer {n}: {answer}\n\n");
            }
        }

        format!(
            "Thank you. Here is what the programmer told me about their intentions:\n\
             \n\
             {pairs}\
             Now give constructive feedback for a {level} programmer. Refer back to the \
             rationale they stated wherever it is relevant, and respect their existing style.\n\
             \n\
             Use these sections:\n\
             \n\
             ## Positive Feedback\n\
             What works well and shows thoughtful decisions.\n\
             \n\
             ## Suggestions for Improvement\n\
             Concrete, actionable suggestions. Explain why each one helps, with short \
             examples where useful.\n\
             \n\
             ## Learning Opportunities\n\
             Concepts, patterns or techniques worth exploring next.\n\
             \n\
             ## Trade-offs\n\
             Interesting trade-offs in the current approach.\n\
             \n\
             Concentrate on: {focus}. Be encouraging and educational, not critical. {experience}",
            focus = self.focus_list(),
            experience = experience_guidance(level),
        )
    }

    /// A follow-up message in an open review. Sent as the learner wrote it.
    #[must_use]
    pub fn follow_up(&self, text: &str) -> String {
        text.trim().to_string()
    }

    /// Asks the model to play a student and produce a flawed exercise.
    #[must_use]
    pub fn exercise(&self, topic: &str, language: &str, round: u32) -> String {
        let level = self.profile.experience_level();
        let difficulty = Difficulty::for_round(round);

        let continuity = if round > 1 {
            format!(
                "This is round {round}. Stay connected to {topic} and the earlier examples in \
                 this conversation, but make a different mistake this time.\n\n"
            )
        } else {
            String::new()
        };

        format!(
            "You are roleplaying as a {level} programming student who needs help with {topic}.\n\
             \n\
             {continuity}\
             Write a SHORT {language} example (5-15 lines) that contains one {difficulty} \
             mistake related to {topic}. The mistake must be instructive, realistic and \
             focused on a single misconception.\n\
             \n\
             Format your response as:\n\
             \n\
             ## Code\n\
             ```{tag}\n\
             [the flawed code]\n\
             ```\n\
             \n\
             ## Student Question\n\
             [A short message in the student's voice: what they tried to do, what happened \
             when they ran it (error, wrong output, odd behaviour) and a specific request \
             for help.]\n\
             \n\
             ## Hidden Issues\n\
             [Bullet list of what is actually wrong. This is for internal tracking and is \
             never shown to the teacher.]\n\
             - Issue",
            tag = fence_tag(language),
        )
    }

    /// Asks the model, still in character, to react to the learner's hints.
    #[must_use]
    pub fn hint_evaluation(&self, topic: &str, exercise: &ExerciseSpec, hints: &str) -> String {
        let level = self.profile.experience_level();

        let issues = if exercise.hidden_issues.is_empty() {
            "- (not recorded; infer them from the code)".to_string()
        } else {
            exercise
                .hidden_issues
                .iter()
                .map(|issue| format!("- {issue}"))
                .collect::<Vec<_>>()
                .join("\n")
        };

        format!(
            "You are still roleplaying as a {level} programming student learning about \
             {topic}. The user is acting as your teacher.\n\
             \n\
             The code you showed:\n\
             ```{tag}\n\
             {code}\n\
             ```\n\
             \n\
             Known issues in the code:\n\
             {issues}\n\
             \n\
             The teacher's hints:\n\
             \"{hints}\"\n\
             \n\
             Judge the hints: were they helpful without giving the answer away, specific \
             enough to guide you, and did they prompt discovery through good questions?\n\
             \n\
             Respond as the student, in character:\n\
             \n\
             ## Student Response\n\
             [React to the hints. Good hints move you closer to understanding. If the answer \
             was handed over, say you got it but would rather have worked it out. If the \
             hints were too vague, ask for clarification.]\n\
             \n\
             ## Teaching Quality Assessment\n\
             [A brief internal note on how well the hints were scaffolded.]\n\
             \n\
             ## Understanding Achieved\n\
             [YES if the hints brought you to understanding, NO if you need more help]",
            tag = fence_tag(&exercise.language),
            code = exercise.code.trim_end(),
            hints = hints.trim(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::FocusArea;
    use crate::parser::parse_exercise;

    fn profile() -> LearnerProfile {
        LearnerProfile::new(
            ExperienceLevel::Beginner,
            QuestionStyle::Direct,
            [FocusArea::Security, FocusArea::Testing],
        )
    }

    // ------------------------------------------------------------------------
    // Difficulty
    // ------------------------------------------------------------------------

    #[test]
    fn test_difficulty_for_round() {
        assert_eq!(Difficulty::for_round(1), Difficulty::Obvious);
        assert_eq!(Difficulty::for_round(2), Difficulty::Subtle);
        assert_eq!(Difficulty::for_round(3), Difficulty::Subtle);
        assert_eq!(Difficulty::for_round(4), Difficulty::Nuanced);
        assert_eq!(Difficulty::for_round(5), Difficulty::Nuanced);
        assert_eq!(Difficulty::for_round(40), Difficulty::Nuanced);
    }

    #[test]
    fn test_difficulty_labels() {
        assert_eq!(Difficulty::for_round(1).label(), "obvious but instructive");
        assert_eq!(Difficulty::for_round(3).label(), "subtle and thought-provoking");
        assert_eq!(
            Difficulty::for_round(4).label(),
            "nuanced, requiring deep understanding"
        );
    }

    #[test]
    fn test_difficulty_is_pure() {
        for round in 1..=10 {
            assert_eq!(Difficulty::for_round(round), Difficulty::for_round(round));
        }
    }

    // ------------------------------------------------------------------------
    // Review prompts
    // ------------------------------------------------------------------------

    #[test]
    fn test_initial_analysis_embeds_profile_and_code() {
        let profile = profile();
        let code = CodeUnit::from_text("calc.py", "Python", "def add(a, b):\n    return a + b\n");
        let prompt = PromptBuilder::new(&profile).initial_analysis(&code);

        assert!(prompt.contains("Experience level: beginner"));
        assert!(prompt.contains("Question style: direct"));
        assert!(prompt.contains("Focus areas: security, testing"));
        assert!(prompt.contains("```python\ndef add(a, b):\n    return a + b\n```"));
        assert!(prompt.contains("Ask 2-3 clarifying questions before judging"));
        assert!(prompt.contains("## Questions"));
        assert!(prompt.contains("## Initial Observations"));
    }

    #[test]
    fn test_initial_analysis_is_deterministic() {
        let profile = profile();
        let code = CodeUnit::from_text("main.rs", "Rust", "fn main() {}");
        let builder = PromptBuilder::new(&profile);
        assert_eq!(builder.initial_analysis(&code), builder.initial_analysis(&code));
    }

    #[test]
    fn test_feedback_request_pairs_answers() {
        let profile = profile();
        let questions = vec!["Why recursion?".to_string(), "Why a dict?".to_string()];
        let answers = vec!["Readability".to_string(), "   ".to_string()];
        let prompt = PromptBuilder::new(&profile).feedback_request(&questions, &answers);

        assert!(prompt.contains("Question 1: Why recursion?\nAnswer 1: Readability"));
        assert!(prompt.contains("Question 2: Why a dict?\nAnswer 2: (no answer given)"));
        assert!(prompt.contains("rationale they stated"));
        assert!(prompt.contains("Concentrate on: security, testing"));
    }

    #[test]
    fn test_feedback_request_without_questions() {
        let profile = profile();
        let prompt = PromptBuilder::new(&profile).feedback_request(&[], &[]);
        assert!(prompt.contains("No clarifying questions were needed"));
        assert!(!prompt.contains("Answer 1"));
    }

    #[test]
    fn test_follow_up_is_trimmed_verbatim() {
        let profile = profile();
        let builder = PromptBuilder::new(&profile);
        assert_eq!(builder.follow_up("  What about lifetimes?\n"), "What about lifetimes?");
    }

    // ------------------------------------------------------------------------
    // Teaching prompts
    // ------------------------------------------------------------------------

    #[test]
    fn test_exercise_prompt_round_one() {
        let profile = profile();
        let prompt = PromptBuilder::new(&profile).exercise("recursion", "Python", 1);

        assert!(prompt.contains("beginner programming student who needs help with recursion"));
        assert!(prompt.contains("obvious but instructive"));
        assert!(prompt.contains("```python"));
        assert!(prompt.contains("## Hidden Issues"));
        assert!(!prompt.contains("This is round"));
    }

    #[test]
    fn test_exercise_prompt_later_round_keeps_continuity() {
        let profile = profile();
        let prompt = PromptBuilder::new(&profile).exercise("closures", "C++", 4);

        assert!(prompt.contains("This is round 4"));
        assert!(prompt.contains("different mistake"));
        assert!(prompt.contains("nuanced, requiring deep understanding"));
        assert!(prompt.contains("```cpp"));
    }

    #[test]
    fn test_hint_evaluation_references_hidden_issues() {
        let profile = profile();
        let raw = "## Code\n```python\ndef f(n):\n    return f(n - 1)\n```\n\n## Student Question\nIt never stops?\n\n## Hidden Issues\n- Missing base case\n";
        let exercise = parse_exercise(raw, 1, "Python");
        let prompt =
            PromptBuilder::new(&profile).hint_evaluation("recursion", &exercise, "  When should it stop?  ");

        assert!(prompt.contains("- Missing base case"));
        assert!(prompt.contains("\"When should it stop?\""));
        assert!(prompt.contains("def f(n):\n    return f(n - 1)"));
        assert!(prompt.contains("## Understanding Achieved"));
    }
}
