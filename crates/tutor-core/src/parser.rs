//! Decoding of model replies into typed records.
//!
//! Model output is semi-structured Markdown. Every function here is total:
//! when the expected headings are missing or mangled the structured fields
//! come back empty and the raw text is still kept, so a careless reply never
//! breaks a session.
//!
//! Extraction walks the reply line by line with a "current section" cursor.
//! A line is heading-like when it is an ATX heading (`## Questions`), a line
//! of bold text (`**Questions**`), or a known label on its own line with an
//! optional inline remainder (`Questions:`, `Understanding Achieved - YES`).
//! Labels are compared after normalisation, so case, punctuation and plurals
//! do not matter. An ATX heading that is not a label of the record being
//! parsed closes the current section; other bold lines are ordinary content.
//! Fenced code blocks are never scanned for headings.

use std::ops::RangeInclusive;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::prompts::Difficulty;

/// Leading list marker: bullet, `1.`, `1)` or `(1)`.
#[allow(clippy::expect_used)]
static LIST_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(?:[-*+•]|\d+[.)]|\(\d+\))\s+").expect("valid list marker regex"));

/// A line that starts with bold text: `**Title**` optionally followed by more text.
#[allow(clippy::expect_used)]
static BOLD_LEAD: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:\*\*|__)(.+?)(?:\*\*|__)\s*:?\s*(.*)$").expect("valid bold heading regex")
});

/// Punctuation accepted between a label and its inline remainder.
const LABEL_SEPARATORS: &[char] = &[':', '-', '\u{2013}', '\u{2014}', '?', '='];

/// Yes/no style answer token.
#[allow(clippy::expect_used)]
static BOOL_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(yes|no|true|false)\b").expect("valid boolean token regex"));

// ============================================================================
// Records
// ============================================================================

/// Clarifying questions and first impressions of a piece of code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Questions for the learner, in the order the model asked them.
    pub questions: Vec<String>,
    /// Initial observations, in order.
    pub observations: Vec<String>,
    /// The unparsed reply.
    pub raw_response: String,
}

/// Heading of a recognised feedback section.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackHeading {
    /// What works well.
    Positive,
    /// Suggestions for improvement.
    Suggestions,
    /// Concepts worth exploring.
    LearningOpportunities,
    /// Trade-offs in the current approach.
    TradeOffs,
}

/// One recognised section of a feedback reply.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackSection {
    /// Which section this is.
    pub heading: FeedbackHeading,
    /// Section text with surrounding blank lines removed.
    pub body: String,
}

/// Feedback on the learner's code, or a reply to a follow-up.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackResult {
    /// Feedback text to show the learner.
    pub feedback: String,
    /// Recognised sections, in reply order. Empty for free-form replies.
    pub sections: Vec<FeedbackSection>,
    /// The unparsed reply.
    pub raw_response: String,
}

impl FeedbackResult {
    /// Returns the body of the first section with the given heading.
    #[must_use]
    pub fn section(&self, heading: FeedbackHeading) -> Option<&str> {
        self.sections
            .iter()
            .find(|section| section.heading == heading)
            .map(|section| section.body.as_str())
    }
}

/// A generated teaching exercise.
///
/// The hidden issues are the model's own notes on what is wrong with the
/// code. They are sent back to the model when hints are evaluated and are
/// never exposed to the learner: use [`ExerciseSpec::learner_view`] for
/// display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseSpec {
    /// Round this exercise belongs to (1-based).
    pub round: u32,
    /// Difficulty tier for the round.
    pub difficulty: Difficulty,
    /// Language the code is written in.
    pub language: String,
    /// The flawed code.
    pub code: String,
    /// The in-character request for help.
    pub student_question: String,
    #[serde(skip)]
    pub(crate) hidden_issues: Vec<String>,
    /// The unparsed reply.
    pub raw_response: String,
}

impl ExerciseSpec {
    /// Returns the parts of the exercise the learner may see.
    #[must_use]
    pub fn learner_view(&self) -> ExerciseView {
        ExerciseView {
            round: self.round,
            difficulty: self.difficulty,
            language: self.language.clone(),
            code: self.code.clone(),
            student_question: self.student_question.clone(),
        }
    }

    /// Number of hidden issues recorded for this exercise.
    #[must_use]
    pub fn hidden_issue_count(&self) -> usize {
        self.hidden_issues.len()
    }
}

/// The learner-facing view of an [`ExerciseSpec`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExerciseView {
    /// Round number.
    pub round: u32,
    /// Difficulty tier.
    pub difficulty: Difficulty,
    /// Language the code is written in.
    pub language: String,
    /// The flawed code.
    pub code: String,
    /// The in-character request for help.
    pub student_question: String,
}

/// The simulated student's reaction to the learner's hints.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationResult {
    /// The in-character response. Falls back to the whole reply.
    pub response: String,
    /// Whether the student reached understanding.
    pub understanding_achieved: bool,
    /// The model's note on teaching quality, if it wrote one.
    pub assessment: Option<String>,
    /// The unparsed reply.
    pub raw_response: String,
}

// ============================================================================
// Bounds
// ============================================================================

/// Expected item counts for an [`AnalysisResult`].
///
/// Parsing never truncates; callers use this to notice replies that drifted
/// from the requested shape.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnalysisBounds {
    /// Allowed number of questions.
    pub questions: RangeInclusive<usize>,
    /// Allowed number of observations.
    pub observations: RangeInclusive<usize>,
}

impl Default for AnalysisBounds {
    fn default() -> Self {
        Self {
            questions: 1..=5,
            observations: 0..=10,
        }
    }
}

impl AnalysisBounds {
    /// Describes every bound the analysis falls outside of.
    #[must_use]
    pub fn violations(&self, analysis: &AnalysisResult) -> Vec<String> {
        let mut violations = Vec::new();
        check_count(
            &mut violations,
            "questions",
            analysis.questions.len(),
            &self.questions,
        );
        check_count(
            &mut violations,
            "observations",
            analysis.observations.len(),
            &self.observations,
        );
        violations
    }
}

fn check_count(out: &mut Vec<String>, what: &str, count: usize, range: &RangeInclusive<usize>) {
    if !range.contains(&count) {
        out.push(format!(
            "expected {}-{} {what}, got {count}",
            range.start(),
            range.end()
        ));
    }
}

// ============================================================================
// Parsers
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AnalysisLabel {
    Questions,
    Observations,
}

const ANALYSIS_LABELS: &[(&str, AnalysisLabel)] = &[
    ("questions", AnalysisLabel::Questions),
    ("clarifying questions", AnalysisLabel::Questions),
    ("initial observations", AnalysisLabel::Observations),
    ("observations", AnalysisLabel::Observations),
];

const FEEDBACK_LABELS: &[(&str, FeedbackHeading)] = &[
    ("positive feedback", FeedbackHeading::Positive),
    ("what's working well", FeedbackHeading::Positive),
    ("strengths", FeedbackHeading::Positive),
    ("suggestions for improvement", FeedbackHeading::Suggestions),
    ("suggestions", FeedbackHeading::Suggestions),
    ("improvements", FeedbackHeading::Suggestions),
    ("learning opportunities", FeedbackHeading::LearningOpportunities),
    ("trade-offs", FeedbackHeading::TradeOffs),
    ("trade-offs discussion", FeedbackHeading::TradeOffs),
    ("tradeoffs", FeedbackHeading::TradeOffs),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExerciseLabel {
    Code,
    StudentQuestion,
    HiddenIssues,
}

const EXERCISE_LABELS: &[(&str, ExerciseLabel)] = &[
    ("code", ExerciseLabel::Code),
    ("student code", ExerciseLabel::Code),
    ("student question", ExerciseLabel::StudentQuestion),
    ("question", ExerciseLabel::StudentQuestion),
    ("hidden issues", ExerciseLabel::HiddenIssues),
    ("issues", ExerciseLabel::HiddenIssues),
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EvaluationLabel {
    StudentResponse,
    Assessment,
    UnderstandingAchieved,
}

const EVALUATION_LABELS: &[(&str, EvaluationLabel)] = &[
    ("student response", EvaluationLabel::StudentResponse),
    ("response", EvaluationLabel::StudentResponse),
    ("teaching quality assessment", EvaluationLabel::Assessment),
    ("assessment", EvaluationLabel::Assessment),
    ("understanding achieved", EvaluationLabel::UnderstandingAchieved),
];

/// Parses an initial-analysis reply.
#[must_use]
pub fn parse_analysis(raw: &str) -> AnalysisResult {
    let mut result = AnalysisResult {
        raw_response: raw.to_string(),
        ..AnalysisResult::default()
    };

    for section in collect_sections(raw, ANALYSIS_LABELS) {
        let items = list_items(&section.lines);
        match section.label {
            AnalysisLabel::Questions => result.questions.extend(items),
            AnalysisLabel::Observations => result.observations.extend(items),
        }
    }

    result
}

/// Parses a feedback or follow-up reply.
///
/// The whole reply is the feedback; recognised sections are split out as well.
#[must_use]
pub fn parse_feedback(raw: &str) -> FeedbackResult {
    let sections = collect_sections(raw, FEEDBACK_LABELS)
        .into_iter()
        .map(|section| FeedbackSection {
            heading: section.label,
            body: block_text(&section.lines),
        })
        .filter(|section| !section.body.is_empty())
        .collect();

    FeedbackResult {
        feedback: raw.trim().to_string(),
        sections,
        raw_response: raw.to_string(),
    }
}

/// Parses an exercise-generation reply for the given round.
///
/// If the reply has no code section, the first fenced block anywhere in it
/// is used as the code.
#[must_use]
pub fn parse_exercise(raw: &str, round: u32, language: &str) -> ExerciseSpec {
    let mut code_lines: Vec<String> = Vec::new();
    let mut question_lines: Vec<String> = Vec::new();
    let mut hidden_issues = Vec::new();

    for section in collect_sections(raw, EXERCISE_LABELS) {
        match section.label {
            ExerciseLabel::Code if code_lines.is_empty() => code_lines = section.lines,
            ExerciseLabel::Code => {}
            ExerciseLabel::StudentQuestion => question_lines.extend(section.lines),
            ExerciseLabel::HiddenIssues => hidden_issues.extend(list_items(&section.lines)),
        }
    }

    let mut code = fenced_block(&code_lines).unwrap_or_else(|| block_text(&code_lines));
    if code.is_empty() {
        let all_lines: Vec<String> = raw.lines().map(str::to_string).collect();
        code = fenced_block(&all_lines).unwrap_or_default();
    }

    let student_question = question_lines
        .iter()
        .map(|line| line.trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ");

    ExerciseSpec {
        round,
        difficulty: Difficulty::for_round(round),
        language: language.to_string(),
        code,
        student_question,
        hidden_issues,
        raw_response: raw.to_string(),
    }
}

/// Parses a roleplay-evaluation reply.
///
/// The understanding flag is the first yes/no token after the
/// "Understanding Achieved" marker; without one it is `false`.
#[must_use]
pub fn parse_evaluation(raw: &str) -> EvaluationResult {
    let mut response_lines: Vec<String> = Vec::new();
    let mut assessment_lines: Vec<String> = Vec::new();
    let mut achieved_lines: Vec<String> = Vec::new();

    for section in collect_sections(raw, EVALUATION_LABELS) {
        match section.label {
            EvaluationLabel::StudentResponse => response_lines.extend(section.lines),
            EvaluationLabel::Assessment => assessment_lines.extend(section.lines),
            EvaluationLabel::UnderstandingAchieved => achieved_lines.extend(section.lines),
        }
    }

    let understanding_achieved = BOOL_TOKEN
        .captures(&achieved_lines.join(" "))
        .is_some_and(|caps| matches!(caps[1].to_ascii_lowercase().as_str(), "yes" | "true"));

    let response = block_text(&response_lines);
    let assessment = block_text(&assessment_lines);

    EvaluationResult {
        response: if response.is_empty() {
            raw.trim().to_string()
        } else {
            response
        },
        understanding_achieved,
        assessment: (!assessment.is_empty()).then_some(assessment),
        raw_response: raw.to_string(),
    }
}

// ============================================================================
// Section scanning
// ============================================================================

struct Section<L> {
    label: L,
    lines: Vec<String>,
}

enum Heading<L> {
    /// A label of the record being parsed, with any inline remainder.
    Known(L, Option<String>),
    /// Heading-like, but not one of ours.
    Unknown,
}

fn collect_sections<L: Copy>(text: &str, labels: &[(&str, L)]) -> Vec<Section<L>> {
    let mut sections: Vec<Section<L>> = Vec::new();
    let mut active = false;
    let mut in_fence = false;

    for line in text.lines() {
        let trimmed = line.trim();

        if is_fence(trimmed) {
            in_fence = !in_fence;
        } else if !in_fence {
            match classify_line(trimmed, labels) {
                Some(Heading::Known(label, remainder)) => {
                    sections.push(Section {
                        label,
                        lines: remainder.into_iter().collect(),
                    });
                    active = true;
                    continue;
                }
                Some(Heading::Unknown) => {
                    active = false;
                    continue;
                }
                None => {}
            }
        }

        if active {
            if let Some(section) = sections.last_mut() {
                section.lines.push(line.trim_end().to_string());
            }
        }
    }

    sections
}

fn classify_line<L: Copy>(line: &str, labels: &[(&str, L)]) -> Option<Heading<L>> {
    if line.is_empty() {
        return None;
    }

    if let Some(title) = atx_heading_text(line) {
        return Some(match_label(title, labels).map_or(Heading::Unknown, |(label, rest)| {
            Heading::Known(label, rest)
        }));
    }

    if let Some(caps) = BOLD_LEAD.captures(line) {
        let rest = caps[2].trim();
        if let Some((label, inner)) = match_label(&caps[1], labels) {
            let remainder = inner.or_else(|| (!rest.is_empty()).then(|| rest.to_string()));
            return Some(Heading::Known(label, remainder));
        }
        // Bold sub-headings and bold list items stay in the current section
        return None;
    }

    match_label(line, labels).map(|(label, rest)| Heading::Known(label, rest))
}

/// Returns the text of an ATX heading (`#` to `######`), or `None`.
fn atx_heading_text(line: &str) -> Option<&str> {
    let hashes = line.chars().take_while(|&c| c == '#').count();
    if hashes == 0 || hashes > 6 {
        return None;
    }
    let rest = &line[hashes..];
    if !rest.is_empty() && !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim().trim_end_matches('#').trim())
}

/// Matches heading text against known labels, splitting off an inline
/// remainder after a separator (`Understanding Achieved: YES`,
/// `Understanding Achieved? Yes`).
fn match_label<L: Copy>(text: &str, labels: &[(&str, L)]) -> Option<(L, Option<String>)> {
    if let Some(label) = lookup_label(text, labels) {
        return Some((label, None));
    }

    text.char_indices()
        .filter(|(_, c)| LABEL_SEPARATORS.contains(c))
        .find_map(|(at, _)| {
            let label = lookup_label(&text[..at], labels)?;
            let rest = text[at..]
                .trim_start_matches(|c: char| LABEL_SEPARATORS.contains(&c) || c.is_whitespace())
                .trim();
            Some((label, (!rest.is_empty()).then(|| rest.to_string())))
        })
}

fn lookup_label<L: Copy>(text: &str, labels: &[(&str, L)]) -> Option<L> {
    let normalized = normalize_label(text);
    if normalized.is_empty() {
        return None;
    }
    labels
        .iter()
        .find(|(candidate, _)| normalize_label(candidate) == normalized)
        .map(|(_, label)| *label)
}

/// Lowercases, drops punctuation and emphasis, and singularises each word.
fn normalize_label(text: &str) -> String {
    let cleaned: String = text
        .chars()
        .filter(|&c| c != '\'' && c != '\u{2019}')
        .flat_map(char::to_lowercase)
        .map(|c| if c.is_alphanumeric() { c } else { ' ' })
        .collect();

    cleaned
        .split_whitespace()
        .map(singularize)
        .collect::<Vec<_>>()
        .join(" ")
}

fn singularize(word: &str) -> &str {
    if word.len() > 3 && word.ends_with('s') && !word.ends_with("ss") {
        &word[..word.len() - 1]
    } else {
        word
    }
}

fn is_fence(line: &str) -> bool {
    line.starts_with("```") || line.starts_with("~~~")
}

/// A line of only `-`, `*`, `_` or `=`, three or more long.
fn is_rule(line: &str) -> bool {
    line.len() >= 3
        && (line.chars().all(|c| c == '-')
            || line.chars().all(|c| c == '*')
            || line.chars().all(|c| c == '_')
            || line.chars().all(|c| c == '='))
}

/// Non-empty lines with list markers and whole-line bold stripped.
fn list_items(lines: &[String]) -> Vec<String> {
    lines
        .iter()
        .map(|line| strip_bold(line.trim()))
        .filter(|line| !line.is_empty() && !is_fence(line) && !is_rule(line))
        .map(|line| strip_bold(LIST_MARKER.replace(line, "").trim()).to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

/// Unwraps a line that is bold from end to end (`**text**` or `__text__`).
fn strip_bold(line: &str) -> &str {
    ["**", "__"]
        .into_iter()
        .find_map(|mark| line.strip_prefix(mark)?.strip_suffix(mark))
        .map_or(line, str::trim)
}

/// Lines joined back into a block with leading and trailing blank lines removed.
fn block_text(lines: &[String]) -> String {
    lines.join("\n").trim_matches('\n').trim_end().to_string()
}

/// Contents of the first fenced code block in `lines`, if it has one.
fn fenced_block(lines: &[String]) -> Option<String> {
    let start = lines.iter().position(|line| is_fence(line.trim()))?;
    let body: Vec<&str> = lines[start + 1..]
        .iter()
        .take_while(|line| !is_fence(line.trim()))
        .map(String::as_str)
        .collect();
    Some(body.join("\n").trim_matches('\n').to_string())
}
