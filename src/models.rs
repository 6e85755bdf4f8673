use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

pub const MAX_SCORE: i64 = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub email: String,
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_hash: Option<String>,
    #[serde(default)]
    pub score: i64,
    #[serde(flatten)]
    pub medals: MedalTally,
}

#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub name: String,
    pub password_hash: Option<String>,
}

impl From<NewUser> for User {
    fn from(new: NewUser) -> Self {
        Self {
            email: new.email,
            name: new.name,
            password_hash: new.password_hash,
            score: 0,
            medals: MedalTally::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RatingRecord {
    pub email: String,
    pub rating: f64,
    pub rated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Medal {
    Gold,
    Silver,
    Bronze,
}

impl Medal {
    /// Medal earned by a score on the 0..=10 scale.
    pub fn for_score(score: i64) -> Option<Medal> {
        match score {
            MAX_SCORE => Some(Medal::Gold),
            8 | 9 => Some(Medal::Silver),
            6 | 7 => Some(Medal::Bronze),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MedalTally {
    #[serde(default)]
    pub gold: u64,
    #[serde(default)]
    pub silver: u64,
    #[serde(default)]
    pub bronze: u64,
}

impl MedalTally {
    pub fn award(&mut self, medal: Medal) {
        match medal {
            Medal::Gold => self.gold += 1,
            Medal::Silver => self.silver += 1,
            Medal::Bronze => self.bronze += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.gold + self.silver + self.bronze
    }
}

impl User {
    /// Records a finished quiz: the latest score always replaces the previous
    /// one, and the matching medal counter (if any) goes up by one.
    pub fn record_score(&mut self, score: i64) -> Option<Medal> {
        self.score = score;
        let medal = Medal::for_score(score);
        if let Some(medal) = medal {
            self.medals.award(medal);
        }
        medal
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreOutcome {
    Updated(MedalTally),
    NotFound,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignupOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RatingOutcome {
    Created,
    Updated,
    UserNotFound,
}

/// Wire answer of the existence and signup routes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Existence {
    #[serde(rename = "exist")]
    Exists,
    #[serde(rename = "notexist")]
    NotExists,
    #[serde(rename = "fail")]
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatPart {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub role: String,
    #[serde(deserialize_with = "parts_or_text")]
    pub parts: Vec<ChatPart>,
}

impl ChatTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".into(),
            parts: vec![ChatPart { text: text.into() }],
        }
    }
}

fn parts_or_text<'de, D>(deserializer: D) -> Result<Vec<ChatPart>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum PartsIn {
        Text(String),
        Parts(Vec<ChatPart>),
    }

    Ok(match PartsIn::deserialize(deserializer)? {
        PartsIn::Text(text) => vec![ChatPart { text }],
        PartsIn::Parts(parts) => parts,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_user() -> User {
        User::from(NewUser {
            email: "ada@example.com".into(),
            name: "Ada".into(),
            password_hash: None,
        })
    }

    #[test]
    fn medal_boundaries() {
        assert_eq!(Medal::for_score(10), Some(Medal::Gold));
        assert_eq!(Medal::for_score(9), Some(Medal::Silver));
        assert_eq!(Medal::for_score(8), Some(Medal::Silver));
        assert_eq!(Medal::for_score(7), Some(Medal::Bronze));
        assert_eq!(Medal::for_score(6), Some(Medal::Bronze));
        for score in 0..=5 {
            assert_eq!(Medal::for_score(score), None);
        }
    }

    #[test]
    fn perfect_score_adds_one_gold() {
        let mut user = sample_user();
        user.score = 3;
        assert_eq!(user.record_score(10), Some(Medal::Gold));
        assert_eq!(user.score, 10);
        assert_eq!(user.medals, MedalTally { gold: 1, silver: 0, bronze: 0 });
    }

    #[test]
    fn low_score_sets_score_only() {
        let mut user = sample_user();
        user.medals = MedalTally { gold: 2, silver: 1, bronze: 4 };
        assert_eq!(user.record_score(5), None);
        assert_eq!(user.score, 5);
        assert_eq!(user.medals, MedalTally { gold: 2, silver: 1, bronze: 4 });
    }

    #[test]
    fn tallies_accumulate_and_score_is_last_write() {
        let mut user = sample_user();
        for score in [8, 6, 9, 7, 10, 2] {
            user.record_score(score);
        }
        assert_eq!(user.score, 2);
        assert_eq!(user.medals, MedalTally { gold: 1, silver: 2, bronze: 2 });
        assert_eq!(user.medals.total(), 5);
    }

    #[test]
    fn existence_wire_strings() {
        assert_eq!(serde_json::to_string(&Existence::Exists).unwrap(), "\"exist\"");
        assert_eq!(serde_json::to_string(&Existence::NotExists).unwrap(), "\"notexist\"");
        assert_eq!(serde_json::to_string(&Existence::Failed).unwrap(), "\"fail\"");
    }

    #[test]
    fn chat_turn_accepts_string_parts() {
        let turns: Vec<ChatTurn> = serde_json::from_value(serde_json::json!([
            {"role": "user", "parts": "Hello"},
            {"role": "model", "parts": [{"text": "Hi"}, {"text": "there"}]}
        ]))
        .unwrap();
        assert_eq!(turns[0], ChatTurn::user("Hello"));
        assert_eq!(turns[1].parts.len(), 2);
        assert_eq!(turns[1].parts[1].text, "there");
    }

    #[test]
    fn user_snapshot_keeps_flat_medal_fields() {
        let mut user = sample_user();
        user.record_score(9);
        let value = serde_json::to_value(&user).unwrap();
        assert_eq!(value["silver"], 1);
        assert_eq!(value["score"], 9);
        assert!(value.get("password_hash").is_none());

        let back: User = serde_json::from_value(serde_json::json!({
            "email": "old@example.com",
            "name": "Old"
        }))
        .unwrap();
        assert_eq!(back.medals, MedalTally::default());
    }
}
