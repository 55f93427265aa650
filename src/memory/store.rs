//! SQLite 记忆存储
//!
//! 两张表：episodes（不可变情景记录）与 user_profiles（按 (user, course) 一行
//! 的画像）。每次调用独立打开连接，写路径串行化，避免跨 await 持有连接。

use std::path::PathBuf;

use chrono::{DateTime, Utc};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params, params_from_iter, Connection, Row};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::AgentError;

/// 一条情景记录；event_type ∈ {qa, mistake, practice, exam}
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Episode {
    pub id: String,
    pub user_id: String,
    pub course_name: String,
    pub event_type: String,
    pub content: String,
    pub importance: f64,
    pub created_at: DateTime<Utc>,
    pub metadata: Value,
}

/// 用户在某门课程上的画像
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserProfile {
    pub user_id: String,
    pub course_name: String,
    pub weak_points: Vec<String>,
    pub pref_style: String,
    pub total_qa: i64,
    pub total_practice: i64,
    pub avg_score: f64,
    pub updated_at: DateTime<Utc>,
}

impl UserProfile {
    pub fn empty(user_id: &str, course_name: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            course_name: course_name.to_string(),
            weak_points: Vec::new(),
            pref_style: "step_by_step".to_string(),
            total_qa: 0,
            total_practice: 0,
            avg_score: 0.0,
            updated_at: Utc::now(),
        }
    }
}

pub struct MemoryStore {
    db_path: PathBuf,
}

impl MemoryStore {
    pub fn new(db_path: impl Into<PathBuf>) -> Result<Self, AgentError> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let store = Self { db_path };
        store.init_schema()?;
        Ok(store)
    }

    fn conn(&self) -> Result<Connection, AgentError> {
        Ok(Connection::open(&self.db_path)?)
    }

    fn init_schema(&self) -> Result<(), AgentError> {
        let conn = self.conn()?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS episodes (
                id          TEXT PRIMARY KEY,
                user_id     TEXT NOT NULL,
                course_name TEXT NOT NULL,
                event_type  TEXT NOT NULL,
                content     TEXT NOT NULL,
                importance  REAL NOT NULL DEFAULT 0.5,
                created_at  TEXT NOT NULL,
                metadata    TEXT NOT NULL DEFAULT '{}'
            );
            CREATE INDEX IF NOT EXISTS idx_ep_course ON episodes(user_id, course_name);
            CREATE INDEX IF NOT EXISTS idx_ep_type ON episodes(event_type);
            CREATE TABLE IF NOT EXISTS user_profiles (
                user_id        TEXT NOT NULL,
                course_name    TEXT NOT NULL,
                weak_points    TEXT NOT NULL DEFAULT '[]',
                pref_style     TEXT NOT NULL DEFAULT 'step_by_step',
                total_qa       INTEGER NOT NULL DEFAULT 0,
                total_practice INTEGER NOT NULL DEFAULT 0,
                avg_score      REAL NOT NULL DEFAULT 0.0,
                updated_at     TEXT NOT NULL,
                PRIMARY KEY (user_id, course_name)
            );",
        )?;
        Ok(())
    }

    pub fn save_episode(
        &self,
        user_id: &str,
        course_name: &str,
        event_type: &str,
        content: &str,
        importance: f64,
        metadata: Value,
    ) -> Result<String, AgentError> {
        let id = Uuid::new_v4().to_string();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO episodes (id, user_id, course_name, event_type, content, importance, created_at, metadata)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                id,
                user_id,
                course_name,
                event_type,
                content,
                importance.clamp(0.0, 1.0),
                Utc::now().to_rfc3339(),
                metadata.to_string(),
            ],
        )?;
        Ok(id)
    }

    /// 关键词 OR 匹配 + 可选类型过滤，按 (importance desc, created_at desc) 排序
    pub fn search_episodes(
        &self,
        user_id: &str,
        course_name: Option<&str>,
        terms: &[String],
        event_types: &[String],
        min_importance: f64,
        limit: usize,
    ) -> Result<Vec<Episode>, AgentError> {
        let mut sql = String::from(
            "SELECT id, user_id, course_name, event_type, content, importance, created_at, metadata
             FROM episodes WHERE user_id = ? AND importance >= ?",
        );
        let mut binds: Vec<SqlValue> = vec![
            SqlValue::Text(user_id.to_string()),
            SqlValue::Real(min_importance),
        ];

        if let Some(course) = course_name {
            sql.push_str(" AND course_name = ?");
            binds.push(SqlValue::Text(course.to_string()));
        }

        if !event_types.is_empty() {
            let marks = vec!["?"; event_types.len()].join(", ");
            sql.push_str(&format!(" AND event_type IN ({marks})"));
            for t in event_types {
                binds.push(SqlValue::Text(t.clone()));
            }
        }

        if !terms.is_empty() {
            let clauses = vec!["content LIKE ?"; terms.len()].join(" OR ");
            sql.push_str(&format!(" AND ({clauses})"));
            for term in terms {
                binds.push(SqlValue::Text(format!("%{term}%")));
            }
        }

        sql.push_str(" ORDER BY importance DESC, created_at DESC LIMIT ?");
        binds.push(SqlValue::Integer(limit as i64));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(binds), row_to_episode)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    pub fn get_recent_episodes(
        &self,
        user_id: &str,
        course_name: &str,
        limit: usize,
    ) -> Result<Vec<Episode>, AgentError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT id, user_id, course_name, event_type, content, importance, created_at, metadata
             FROM episodes WHERE user_id = ?1 AND course_name = ?2
             ORDER BY created_at DESC LIMIT ?3",
        )?;
        let rows = stmt.query_map(params![user_id, course_name, limit as i64], row_to_episode)?;
        Ok(rows.collect::<Result<Vec<_>, _>>()?)
    }

    /// 不存在时返回默认画像，不落库
    pub fn get_profile(&self, user_id: &str, course_name: &str) -> Result<UserProfile, AgentError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare(
            "SELECT user_id, course_name, weak_points, pref_style, total_qa, total_practice, avg_score, updated_at
             FROM user_profiles WHERE user_id = ?1 AND course_name = ?2",
        )?;
        let mut rows = stmt.query_map(params![user_id, course_name], row_to_profile)?;
        match rows.next() {
            Some(row) => Ok(row?),
            None => Ok(UserProfile::empty(user_id, course_name)),
        }
    }

    pub fn upsert_profile(&self, profile: &UserProfile) -> Result<(), AgentError> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO user_profiles
             (user_id, course_name, weak_points, pref_style, total_qa, total_practice, avg_score, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                profile.user_id,
                profile.course_name,
                serde_json::to_string(&profile.weak_points).unwrap_or_else(|_| "[]".to_string()),
                profile.pref_style,
                profile.total_qa,
                profile.total_practice,
                profile.avg_score,
                Utc::now().to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// (总记录数, 按类型分布)
    pub fn get_stats(
        &self,
        user_id: &str,
        course_name: &str,
    ) -> Result<(i64, Vec<(String, i64)>), AgentError> {
        let conn = self.conn()?;
        let total: i64 = conn.query_row(
            "SELECT COUNT(*) FROM episodes WHERE user_id = ?1 AND course_name = ?2",
            params![user_id, course_name],
            |r| r.get(0),
        )?;
        let mut stmt = conn.prepare(
            "SELECT event_type, COUNT(*) FROM episodes
             WHERE user_id = ?1 AND course_name = ?2 GROUP BY event_type ORDER BY event_type",
        )?;
        let by_type = stmt
            .query_map(params![user_id, course_name], |r| {
                Ok((r.get::<_, String>(0)?, r.get::<_, i64>(1)?))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok((total, by_type))
    }
}

fn row_to_episode(row: &Row<'_>) -> rusqlite::Result<Episode> {
    let created_at: String = row.get(6)?;
    let metadata: String = row.get(7)?;
    Ok(Episode {
        id: row.get(0)?,
        user_id: row.get(1)?,
        course_name: row.get(2)?,
        event_type: row.get(3)?,
        content: row.get(4)?,
        importance: row.get(5)?,
        created_at: DateTime::parse_from_rfc3339(&created_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
        metadata: serde_json::from_str(&metadata).unwrap_or(Value::Null),
    })
}

fn row_to_profile(row: &Row<'_>) -> rusqlite::Result<UserProfile> {
    let weak_points: String = row.get(2)?;
    let updated_at: String = row.get(7)?;
    Ok(UserProfile {
        user_id: row.get(0)?,
        course_name: row.get(1)?,
        weak_points: serde_json::from_str(&weak_points).unwrap_or_default(),
        pref_style: row.get(3)?,
        total_qa: row.get(4)?,
        total_practice: row.get(5)?,
        avg_score: row.get(6)?,
        updated_at: DateTime::parse_from_rfc3339(&updated_at)
            .map(|t| t.with_timezone(&Utc))
            .unwrap_or_else(|_| Utc::now()),
    })
}

/// 测试辅助：把 db 放进临时目录
#[cfg(test)]
pub(crate) fn temp_store(dir: &std::path::Path) -> MemoryStore {
    MemoryStore::new(dir.join("memory.db")).expect("temp store")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn search_orders_by_importance_then_recency() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(dir.path());
        store
            .save_episode("u", "线性代数", "qa", "矩阵的秩是什么", 0.5, json!({}))
            .unwrap();
        store
            .save_episode("u", "线性代数", "mistake", "秩的计算出错", 0.9, json!({}))
            .unwrap();
        store
            .save_episode("u", "线性代数", "practice", "秩的练习", 0.4, json!({}))
            .unwrap();

        let hits = store
            .search_episodes("u", Some("线性代数"), &["秩".to_string()], &[], 0.0, 10)
            .unwrap();
        assert_eq!(hits.len(), 3);
        assert_eq!(hits[0].event_type, "mistake");
        assert_eq!(hits[1].event_type, "qa");
        assert_eq!(hits[2].event_type, "practice");
    }

    #[test]
    fn type_filter_and_min_importance() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(dir.path());
        store
            .save_episode("u", "c", "qa", "普通问答", 0.5, json!({}))
            .unwrap();
        store
            .save_episode("u", "c", "mistake", "错题", 0.9, json!({}))
            .unwrap();

        let only_mistakes = store
            .search_episodes("u", Some("c"), &[], &["mistake".to_string()], 0.0, 10)
            .unwrap();
        assert_eq!(only_mistakes.len(), 1);

        let important = store
            .search_episodes("u", Some("c"), &[], &[], 0.8, 10)
            .unwrap();
        assert_eq!(important.len(), 1);
        assert_eq!(important[0].event_type, "mistake");
    }

    #[test]
    fn recent_episodes_are_newest_first() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(dir.path());
        for (i, content) in ["第一条", "第二条", "第三条"].iter().enumerate() {
            store
                .save_episode("u", "c", "qa", content, 0.5 + i as f64 * 0.01, json!({}))
                .unwrap();
            std::thread::sleep(std::time::Duration::from_millis(5));
        }
        let recent = store.get_recent_episodes("u", "c", 2).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "第三条");
        assert_eq!(recent[1].content, "第二条");
    }

    #[test]
    fn missing_profile_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(dir.path());
        let p = store.get_profile("u", "c").unwrap();
        assert_eq!(p.pref_style, "step_by_step");
        assert_eq!(p.total_qa, 0);
        assert!(p.weak_points.is_empty());
    }

    #[test]
    fn profile_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let store = temp_store(dir.path());
        let mut p = UserProfile::empty("u", "c");
        p.weak_points = vec!["矩阵的秩".to_string()];
        p.total_qa = 3;
        p.avg_score = 82.5;
        store.upsert_profile(&p).unwrap();

        let loaded = store.get_profile("u", "c").unwrap();
        assert_eq!(loaded.weak_points, vec!["矩阵的秩".to_string()]);
        assert_eq!(loaded.total_qa, 3);
        assert!((loaded.avg_score - 82.5).abs() < 1e-9);
    }
}
