use crate::error::StoreError;
use crate::models::{MedalTally, NewUser, RatingOutcome, RatingRecord, ScoreOutcome, SignupOutcome, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions};
use std::collections::HashMap;
use std::time::Duration;
use std::{fs, path::Path};
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

/// Persistence seam for user bookkeeping. Every mutating call applies its
/// read-modify-write as one atomic step on the backing store.
#[async_trait]
pub trait UserStore: Send + Sync {
    async fn find_user(&self, email: &str) -> Result<Option<User>, StoreError>;

    async fn create_user(&self, user: NewUser) -> Result<SignupOutcome, StoreError>;

    async fn record_score(&self, email: &str, score: i64) -> Result<ScoreOutcome, StoreError>;

    async fn save_rating(&self, email: &str, rating: f64) -> Result<RatingOutcome, StoreError>;

    async fn user_exists(&self, email: &str) -> Result<bool, StoreError> {
        Ok(self.find_user(email).await?.is_some())
    }

    async fn medal_counts(&self, email: &str) -> Result<Option<MedalTally>, StoreError> {
        Ok(self.find_user(email).await?.map(|u| u.medals))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct PersistentSnapshot {
    users: HashMap<String, User>,
    ratings: HashMap<String, RatingRecord>,
}

pub struct InMemoryStore {
    users: RwLock<HashMap<String, User>>,
    ratings: RwLock<HashMap<String, RatingRecord>>,
    snapshot_path: Option<String>,
    // Held from cloning the maps until the file is renamed into place, so an
    // older snapshot can never land after a newer one.
    persist_lock: Mutex<()>,
}

impl InMemoryStore {
    pub fn new(snapshot_path: Option<&str>) -> Self {
        let snapshot = snapshot_path
            .and_then(|path| {
                let raw = fs::read_to_string(path).ok()?;
                match serde_json::from_str::<PersistentSnapshot>(&raw) {
                    Ok(s) => Some(s),
                    Err(err) => {
                        warn!("failed to read local snapshot {}: {}", path, err);
                        None
                    }
                }
            })
            .unwrap_or_default();

        Self {
            users: RwLock::new(snapshot.users),
            ratings: RwLock::new(snapshot.ratings),
            snapshot_path: snapshot_path.map(str::to_string),
            persist_lock: Mutex::new(()),
        }
    }

    async fn persist(&self) -> anyhow::Result<()> {
        let Some(path) = self.snapshot_path.as_ref() else {
            return Ok(());
        };
        let _guard = self.persist_lock.lock().await;
        let snapshot = PersistentSnapshot {
            users: self.users.read().await.clone(),
            ratings: self.ratings.read().await.clone(),
        };
        let serialized = serde_json::to_vec_pretty(&snapshot)?;
        let target = Path::new(path);
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = target.with_extension("json.tmp");
        tokio::fs::write(&tmp, serialized).await?;
        tokio::fs::rename(&tmp, target).await?;
        Ok(())
    }

    async fn persist_or_warn(&self, op: &str) {
        if let Err(err) = self.persist().await {
            warn!("failed to persist local state after {}: {}", op, err);
        }
    }
}

#[async_trait]
impl UserStore for InMemoryStore {
    async fn find_user(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.users.read().await.get(email).cloned())
    }

    async fn create_user(&self, user: NewUser) -> Result<SignupOutcome, StoreError> {
        {
            let mut users = self.users.write().await;
            if users.contains_key(&user.email) {
                return Ok(SignupOutcome::AlreadyExists);
            }
            users.insert(user.email.clone(), User::from(user));
        }
        self.persist_or_warn("signup").await;
        Ok(SignupOutcome::Created)
    }

    async fn record_score(&self, email: &str, score: i64) -> Result<ScoreOutcome, StoreError> {
        let tally = {
            let mut users = self.users.write().await;
            let Some(user) = users.get_mut(email) else {
                return Ok(ScoreOutcome::NotFound);
            };
            user.record_score(score);
            user.medals
        };
        self.persist_or_warn("save_score").await;
        Ok(ScoreOutcome::Updated(tally))
    }

    async fn save_rating(&self, email: &str, rating: f64) -> Result<RatingOutcome, StoreError> {
        if !self.users.read().await.contains_key(email) {
            return Ok(RatingOutcome::UserNotFound);
        }
        let record = RatingRecord {
            email: email.to_string(),
            rating,
            rated_at: Utc::now(),
        };
        let previous = self.ratings.write().await.insert(email.to_string(), record);
        self.persist_or_warn("save_rating").await;
        Ok(match previous {
            Some(_) => RatingOutcome::Updated,
            None => RatingOutcome::Created,
        })
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    email: String,
    name: String,
    password_hash: Option<String>,
    score: i64,
    gold: u64,
    silver: u64,
    bronze: u64,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        Self {
            email: row.email,
            name: row.name,
            password_hash: row.password_hash,
            score: row.score,
            medals: MedalTally {
                gold: row.gold,
                silver: row.silver,
                bronze: row.bronze,
            },
        }
    }
}

const SELECT_USER: &str =
    "SELECT email, name, password_hash, score, gold, silver, bronze FROM users WHERE email = ?";

pub struct MySqlStore {
    pool: MySqlPool,
}

impl MySqlStore {
    pub async fn connect(database_url: &str) -> Result<Self, StoreError> {
        let pool = MySqlPoolOptions::new()
            .max_connections(5)
            .acquire_timeout(Duration::from_secs(3))
            .connect(database_url)
            .await?;
        sqlx::migrate!("./migrations").run(&pool).await?;
        info!("mysql connected and migrations applied");
        Ok(Self { pool })
    }
}

#[async_trait]
impl UserStore for MySqlStore {
    async fn find_user(&self, email: &str) -> Result<Option<User>, StoreError> {
        let row = sqlx::query_as::<_, UserRow>(SELECT_USER)
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(User::from))
    }

    async fn user_exists(&self, email: &str) -> Result<bool, StoreError> {
        let found: Option<String> = sqlx::query_scalar("SELECT email FROM users WHERE email = ?")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        Ok(found.is_some())
    }

    async fn create_user(&self, user: NewUser) -> Result<SignupOutcome, StoreError> {
        let inserted = sqlx::query("INSERT INTO users (email, name, password_hash) VALUES (?, ?, ?)")
            .bind(&user.email)
            .bind(&user.name)
            .bind(&user.password_hash)
            .execute(&self.pool)
            .await;
        match inserted {
            Ok(_) => Ok(SignupOutcome::Created),
            Err(err)
                if err
                    .as_database_error()
                    .is_some_and(|db| db.is_unique_violation()) =>
            {
                Ok(SignupOutcome::AlreadyExists)
            }
            Err(err) => Err(err.into()),
        }
    }

    async fn record_score(&self, email: &str, score: i64) -> Result<ScoreOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} FOR UPDATE"))
            .bind(email)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(row) = row else {
            tx.rollback().await?;
            return Ok(ScoreOutcome::NotFound);
        };

        let mut user = User::from(row);
        user.record_score(score);
        sqlx::query("UPDATE users SET score = ?, gold = ?, silver = ?, bronze = ? WHERE email = ?")
            .bind(user.score)
            .bind(user.medals.gold)
            .bind(user.medals.silver)
            .bind(user.medals.bronze)
            .bind(email)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;
        Ok(ScoreOutcome::Updated(user.medals))
    }

    async fn save_rating(&self, email: &str, rating: f64) -> Result<RatingOutcome, StoreError> {
        let mut tx = self.pool.begin().await?;
        let user: Option<String> = sqlx::query_scalar("SELECT email FROM users WHERE email = ? FOR UPDATE")
            .bind(email)
            .fetch_optional(&mut *tx)
            .await?;
        if user.is_none() {
            tx.rollback().await?;
            return Ok(RatingOutcome::UserNotFound);
        }

        let existing: Option<String> =
            sqlx::query_scalar("SELECT email FROM ratings WHERE email = ? FOR UPDATE")
                .bind(email)
                .fetch_optional(&mut *tx)
                .await?;
        let now: DateTime<Utc> = Utc::now();
        let outcome = if existing.is_some() {
            sqlx::query("UPDATE ratings SET rating = ?, rated_at = ? WHERE email = ?")
                .bind(rating)
                .bind(now)
                .bind(email)
                .execute(&mut *tx)
                .await?;
            RatingOutcome::Updated
        } else {
            sqlx::query("INSERT INTO ratings (email, rating, rated_at) VALUES (?, ?, ?)")
                .bind(email)
                .bind(rating)
                .bind(now)
                .execute(&mut *tx)
                .await?;
            RatingOutcome::Created
        };
        tx.commit().await?;
        Ok(outcome)
    }
}
