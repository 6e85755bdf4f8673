use serde::{Deserialize, Serialize};
use validator::Validate;

pub const PAIR_SEPARATOR: &str = "::";
pub const DEFAULT_DIFFICULTY: &str = "medium";
pub const DEFAULT_QUESTION_COUNT: usize = 10;

fn default_difficulty() -> String {
    DEFAULT_DIFFICULTY.to_string()
}

fn default_question_count() -> usize {
    DEFAULT_QUESTION_COUNT
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct QuizRequest {
    #[validate(length(min = 1, max = 200, message = "must not be empty"))]
    pub topic: String,
    #[serde(default = "default_difficulty")]
    #[validate(length(min = 1, max = 50))]
    pub difficulty: String,
    #[serde(rename = "questionCount", default = "default_question_count")]
    #[validate(range(min = 1, max = 20))]
    pub question_count: usize,
}

pub fn build_prompt(request: &QuizRequest) -> String {
    format!(
        "Generate a {} quiz containing one word answers with {} questions on the topic {}. \
         Format each question followed by its answer, using \"{sep}\" to separate the question and answer. \
         Example: \"Question {sep} Answer\". No additional formatting.",
        request.difficulty.trim(),
        request.question_count,
        request.topic.trim(),
        sep = PAIR_SEPARATOR,
    )
}

/// Questions and answers recovered from a quiz text blob.
///
/// The two sequences are only ever extended together, so `questions()[i]`
/// is always answered by `answers()[i]`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ParsedQuiz {
    questions: Vec<String>,
    answers: Vec<String>,
    #[serde(skip)]
    dropped: usize,
}

impl ParsedQuiz {
    fn push_pair(&mut self, question: &str, answer: &str) {
        self.questions.push(question.to_string());
        self.answers.push(answer.to_string());
    }

    pub fn questions(&self) -> &[String] {
        &self.questions
    }

    pub fn answers(&self) -> &[String] {
        &self.answers
    }

    /// Non-blank lines that did not yield a pair.
    pub fn dropped(&self) -> usize {
        self.dropped
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    #[cfg(test)]
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.questions
            .iter()
            .zip(self.answers.iter())
            .map(|(q, a)| (q.as_str(), a.as_str()))
    }
}

/// Best-effort split of `Question :: Answer` lines.
///
/// Only the first separator splits the line; text after a second separator is
/// discarded, so a question or answer containing `::` comes out truncated.
pub fn parse_quiz_text(raw: &str) -> ParsedQuiz {
    let mut parsed = ParsedQuiz::default();
    for line in raw.lines().filter(|l| !l.trim().is_empty()) {
        let mut parts = line.split(PAIR_SEPARATOR);
        let question = parts.next().unwrap_or_default().trim();
        let answer = parts.next().unwrap_or_default().trim();
        if question.is_empty() || answer.is_empty() {
            parsed.dropped += 1;
            continue;
        }
        parsed.push_pair(question, answer);
    }
    parsed
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_pairs_and_skips_blank_lines() {
        let parsed = parse_quiz_text("Capital of France :: Paris\n\nLargest planet::Jupiter");
        assert_eq!(parsed.questions(), ["Capital of France", "Largest planet"]);
        assert_eq!(parsed.answers(), ["Paris", "Jupiter"]);
        assert_eq!(parsed.dropped(), 0);
    }

    #[test]
    fn line_without_separator_contributes_nothing() {
        let parsed = parse_quiz_text("Here is your quiz:\nQ1 :: A1\nGood luck!");
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed.answers().len(), 1);
        assert_eq!(parsed.dropped(), 2);
    }

    #[test]
    fn empty_side_is_dropped() {
        let parsed = parse_quiz_text(" :: orphan answer\norphan question ::   \n::\nQ :: A");
        assert_eq!(parsed.pairs().collect::<Vec<_>>(), vec![("Q", "A")]);
        assert_eq!(parsed.dropped(), 3);
    }

    #[test]
    fn only_first_separator_splits() {
        let parsed = parse_quiz_text("What is a::b? :: path :: ignored");
        assert_eq!(parsed.questions(), ["What is a"]);
        assert_eq!(parsed.answers(), ["b?"]);
    }

    #[test]
    fn blank_and_crlf_lines_anywhere() {
        let parsed = parse_quiz_text("\r\n   \nQ1 :: A1\r\n\t\nQ2 :: A2\r\n\n");
        assert_eq!(parsed.questions(), ["Q1", "Q2"]);
        assert_eq!(parsed.answers(), ["A1", "A2"]);
        assert_eq!(parsed.dropped(), 0);
    }

    #[test]
    fn empty_input_gives_empty_quiz() {
        let parsed = parse_quiz_text("");
        assert!(parsed.is_empty());
        assert_eq!(parsed.answers().len(), 0);
    }

    #[test]
    fn sequences_stay_aligned_on_noisy_input() {
        let noisy = "a::b\n::\nc::\n::d\ne :: f :: g\nnothing here\n\n h ::i";
        let parsed = parse_quiz_text(noisy);
        assert_eq!(parsed.questions().len(), parsed.answers().len());
        assert_eq!(
            parsed.pairs().collect::<Vec<_>>(),
            vec![("a", "b"), ("e", "f"), ("h", "i")]
        );
    }

    #[test]
    fn serializes_without_drop_count() {
        let parsed = parse_quiz_text("Q :: A\njunk");
        let value = serde_json::to_value(&parsed).unwrap();
        assert_eq!(value, serde_json::json!({"questions": ["Q"], "answers": ["A"]}));
    }

    #[test]
    fn prompt_mentions_topic_difficulty_and_format() {
        let req = QuizRequest {
            topic: " Astronomy ".into(),
            difficulty: "hard".into(),
            question_count: 10,
        };
        let prompt = build_prompt(&req);
        assert!(prompt.contains("Generate a hard quiz"));
        assert!(prompt.contains("with 10 questions on the topic Astronomy."));
        assert!(prompt.contains("\"Question :: Answer\""));
    }

    #[test]
    fn request_defaults_and_limits() {
        let req: QuizRequest = serde_json::from_str(r#"{"topic": "Rust"}"#).unwrap();
        assert_eq!(req.difficulty, "medium");
        assert_eq!(req.question_count, 10);
        assert!(req.validate().is_ok());

        let too_many: QuizRequest =
            serde_json::from_str(r#"{"topic": "Rust", "questionCount": 50}"#).unwrap();
        assert!(too_many.validate().is_err());
    }
}
