//! 课程工作区
//!
//! 每门课程一个目录：`{root}/{课程名}/{uploads,index,notes,mistakes,exams,practices}`。
//! 目录本身就是事实来源，启动时扫描根目录重建注册表，不另设清单文件。

use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::AgentError;

const SUBDIRS: [&str; 6] = ["uploads", "index", "notes", "mistakes", "exams", "practices"];

/// 课程名必须是单个路径段：拒绝空串、`.`、`..` 以及含分隔符的名字
pub fn sanitize_course_name(name: &str) -> Result<String, AgentError> {
    let trimmed = name.trim();
    if trimmed.is_empty() || trimmed == "." || trimmed == ".." {
        return Err(AgentError::InvalidWorkspaceName(name.to_string()));
    }
    if trimmed.contains('/') || trimmed.contains('\\') {
        return Err(AgentError::InvalidWorkspaceName(name.to_string()));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Workspace {
    pub course_name: String,
    pub subject: Option<String>,
    pub created_at: DateTime<Utc>,
    pub documents: Vec<String>,
    root: PathBuf,
}

impl Workspace {
    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn uploads_dir(&self) -> PathBuf {
        self.root.join("uploads")
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.join("index")
    }

    /// 向量索引的公共前缀，两份工件分别是 `.vec.json` 与 `.meta.json`
    pub fn index_base(&self) -> PathBuf {
        self.index_dir().join("vector_index")
    }

    pub fn notes_dir(&self) -> PathBuf {
        self.root.join("notes")
    }

    pub fn mistakes_dir(&self) -> PathBuf {
        self.root.join("mistakes")
    }

    pub fn exams_dir(&self) -> PathBuf {
        self.root.join("exams")
    }

    pub fn practices_dir(&self) -> PathBuf {
        self.root.join("practices")
    }

    pub fn has_index(&self) -> bool {
        self.index_base().with_extension("vec.json").exists()
            && self.index_base().with_extension("meta.json").exists()
    }

    fn scan_documents(uploads: &Path) -> Vec<String> {
        let mut docs = Vec::new();
        if let Ok(entries) = fs::read_dir(uploads) {
            for entry in entries.flatten() {
                if entry.path().is_file() {
                    docs.push(entry.file_name().to_string_lossy().to_string());
                }
            }
        }
        docs.sort();
        docs
    }
}

/// 工作区注册表；读多写少，用 std RwLock 守护
pub struct WorkspaceRegistry {
    root: PathBuf,
    workspaces: RwLock<HashMap<String, Workspace>>,
}

impl WorkspaceRegistry {
    /// 扫描根目录，把已有课程目录装载进内存并补齐缺失的子目录
    pub fn new(root: PathBuf) -> Result<Self, AgentError> {
        fs::create_dir_all(&root)?;
        let mut map = HashMap::new();
        for entry in fs::read_dir(&root)?.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if sanitize_course_name(&name).is_err() {
                tracing::warn!(course = %name, "跳过非法命名的工作区目录");
                continue;
            }
            for sub in SUBDIRS {
                fs::create_dir_all(path.join(sub))?;
            }
            let created_at = entry
                .metadata()
                .ok()
                .and_then(|m| m.created().ok())
                .map(DateTime::<Utc>::from)
                .unwrap_or_else(Utc::now);
            let ws = Workspace {
                course_name: name.clone(),
                subject: None,
                created_at,
                documents: Workspace::scan_documents(&path.join("uploads")),
                root: path,
            };
            map.insert(name, ws);
        }
        tracing::info!(count = map.len(), "工作区注册表已装载");
        Ok(Self {
            root,
            workspaces: RwLock::new(map),
        })
    }

    pub fn create(&self, name: &str, subject: Option<String>) -> Result<Workspace, AgentError> {
        let name = sanitize_course_name(name)?;
        let path = self.root.join(&name);
        for sub in SUBDIRS {
            fs::create_dir_all(path.join(sub))?;
        }
        let ws = Workspace {
            course_name: name.clone(),
            subject,
            created_at: Utc::now(),
            documents: Workspace::scan_documents(&path.join("uploads")),
            root: path,
        };
        self.workspaces
            .write()
            .expect("workspace lock poisoned")
            .insert(name, ws.clone());
        Ok(ws)
    }

    pub fn get(&self, name: &str) -> Result<Workspace, AgentError> {
        let name = sanitize_course_name(name)?;
        self.workspaces
            .read()
            .expect("workspace lock poisoned")
            .get(&name)
            .cloned()
            .ok_or(AgentError::WorkspaceNotFound(name))
    }

    /// 取工作区，不存在则当场创建（对话入口允许首聊即建课）
    pub fn get_or_create(&self, name: &str) -> Result<Workspace, AgentError> {
        match self.get(name) {
            Ok(ws) => Ok(ws),
            Err(AgentError::WorkspaceNotFound(_)) => self.create(name, None),
            Err(e) => Err(e),
        }
    }

    pub fn list(&self) -> Vec<Workspace> {
        let mut all: Vec<Workspace> = self
            .workspaces
            .read()
            .expect("workspace lock poisoned")
            .values()
            .cloned()
            .collect();
        all.sort_by(|a, b| a.course_name.cmp(&b.course_name));
        all
    }

    /// 把一份文件登记到 uploads/（内容由调用方事先写好或随后写入）
    pub fn add_document(&self, course: &str, filename: &str) -> Result<PathBuf, AgentError> {
        let ws = self.get(course)?;
        // 只取文件名部分，丢弃调用方传入的任何目录成分
        let base = Path::new(filename)
            .file_name()
            .ok_or_else(|| AgentError::InvalidWorkspaceName(filename.to_string()))?;
        let dest = ws.uploads_dir().join(base);
        let mut guard = self.workspaces.write().expect("workspace lock poisoned");
        if let Some(entry) = guard.get_mut(&ws.course_name) {
            let name = base.to_string_lossy().to_string();
            if !entry.documents.contains(&name) {
                entry.documents.push(name);
                entry.documents.sort();
            }
        }
        Ok(dest)
    }

    pub fn remove_document(&self, course: &str, filename: &str) -> Result<(), AgentError> {
        let ws = self.get(course)?;
        let base = Path::new(filename)
            .file_name()
            .ok_or_else(|| AgentError::InvalidWorkspaceName(filename.to_string()))?;
        let target = ws.uploads_dir().join(base);
        if target.exists() {
            fs::remove_file(&target)?;
        }
        let mut guard = self.workspaces.write().expect("workspace lock poisoned");
        if let Some(entry) = guard.get_mut(&ws.course_name) {
            let name = base.to_string_lossy().to_string();
            entry.documents.retain(|d| d != &name);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_rejects_traversal() {
        assert!(sanitize_course_name("..").is_err());
        assert!(sanitize_course_name(".").is_err());
        assert!(sanitize_course_name("").is_err());
        assert!(sanitize_course_name("  ").is_err());
        assert!(sanitize_course_name("a/b").is_err());
        assert!(sanitize_course_name("a\\b").is_err());
        assert_eq!(sanitize_course_name(" 线性代数 ").unwrap(), "线性代数");
    }

    #[test]
    fn document_registration_strips_directories() {
        let dir = tempfile::tempdir().unwrap();
        let reg = WorkspaceRegistry::new(dir.path().to_path_buf()).unwrap();
        let ws = reg.create("高等数学", None).unwrap();

        let dest = reg.add_document("高等数学", "../外面/第一章.txt").unwrap();
        assert_eq!(dest, ws.uploads_dir().join("第一章.txt"));
        std::fs::write(&dest, "内容").unwrap();
        assert_eq!(
            reg.get("高等数学").unwrap().documents,
            vec!["第一章.txt".to_string()]
        );

        reg.remove_document("高等数学", "第一章.txt").unwrap();
        assert!(!dest.exists());
        assert!(reg.get("高等数学").unwrap().documents.is_empty());
    }

    #[test]
    fn registry_creates_and_rescans() {
        let dir = tempfile::tempdir().unwrap();
        let reg = WorkspaceRegistry::new(dir.path().to_path_buf()).unwrap();
        let ws = reg.create("线性代数", Some("数学".to_string())).unwrap();
        assert!(ws.uploads_dir().is_dir());
        assert!(ws.practices_dir().is_dir());
        std::fs::write(ws.uploads_dir().join("ch1.txt"), "内容").unwrap();

        let reg2 = WorkspaceRegistry::new(dir.path().to_path_buf()).unwrap();
        let ws2 = reg2.get("线性代数").unwrap();
        assert_eq!(ws2.documents, vec!["ch1.txt".to_string()]);
        assert!(!ws2.has_index());
    }
}
