//! 技能加载器
//!
//! 从技能目录加载 skill.toml + capability.md 并缓存；Evaluator 用摘要列表做选择，
//! Generator 用能力描述与限定工具子集构建上下文。

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use serde::Deserialize;
use tokio::sync::RwLock;

/// 技能元数据（skill.toml 的 [skill] 段）
#[derive(Debug, Clone, Deserialize)]
pub struct SkillMeta {
    pub id: String,
    pub name: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
    /// 该技能允许使用的工具；为空表示不限制
    #[serde(default)]
    pub tools: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct SkillToml {
    skill: SkillMeta,
}

/// 完整技能数据
#[derive(Debug, Clone)]
pub struct Skill {
    pub meta: SkillMeta,
    pub capability: String,
    pub dir: PathBuf,
}

impl Skill {
    /// 供 Evaluator 选择的一行摘要
    pub fn summary(&self) -> String {
        format!(
            "[{}] {}: {}",
            self.meta.id, self.meta.name, self.meta.description
        )
    }

    /// 完整能力描述（包含 capability.md 内容）
    pub fn full_capability(&self) -> String {
        format!(
            "# {} ({})\n\n{}\n\n{}",
            self.meta.name, self.meta.id, self.meta.description, self.capability
        )
    }

    pub fn allowed_tools(&self) -> &[String] {
        &self.meta.tools
    }
}

/// 技能缓存
pub type SkillCache = Arc<RwLock<BTreeMap<String, Skill>>>;

/// 技能加载器
pub struct SkillLoader {
    skills_dir: PathBuf,
    cache: SkillCache,
}

impl SkillLoader {
    pub fn new(skills_dir: impl AsRef<Path>) -> Self {
        Self {
            skills_dir: skills_dir.as_ref().to_path_buf(),
            cache: Arc::new(RwLock::new(BTreeMap::new())),
        }
    }

    /// 空目录，无技能
    pub fn empty() -> Self {
        Self::new(PathBuf::new())
    }

    /// 直接以内存中的技能构造（测试与嵌入式使用）
    pub fn from_skills(skills: impl IntoIterator<Item = Skill>) -> Self {
        let map = skills
            .into_iter()
            .map(|s| (s.meta.id.clone(), s))
            .collect::<BTreeMap<_, _>>();
        Self {
            skills_dir: PathBuf::new(),
            cache: Arc::new(RwLock::new(map)),
        }
    }

    pub fn cache(&self) -> SkillCache {
        Arc::clone(&self.cache)
    }

    /// 加载目录下所有技能并缓存；目录不存在时返回空列表
    pub async fn load_all(&self) -> anyhow::Result<Vec<Skill>> {
        let mut skills = Vec::new();

        if self.skills_dir.as_os_str().is_empty() || !self.skills_dir.exists() {
            return Ok(skills);
        }

        let entries = std::fs::read_dir(&self.skills_dir)
            .with_context(|| format!("reading {}", self.skills_dir.display()))?;
        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() {
                continue;
            }
            match Self::load_skill(&path) {
                Ok(Some(skill)) => skills.push(skill),
                Ok(None) => {}
                Err(e) => tracing::warn!(dir = %path.display(), "skipping skill: {:#}", e),
            }
        }

        let mut cache = self.cache.write().await;
        for skill in &skills {
            cache.insert(skill.meta.id.clone(), skill.clone());
        }

        tracing::info!("Loaded {} skills", skills.len());
        Ok(skills)
    }

    /// 加载单个技能；没有 skill.toml 的目录返回 None
    fn load_skill(dir: &Path) -> anyhow::Result<Option<Skill>> {
        let skill_toml = dir.join("skill.toml");
        if !skill_toml.exists() {
            return Ok(None);
        }

        let toml_content = std::fs::read_to_string(&skill_toml)?;
        let skill_data: SkillToml =
            toml::from_str(&toml_content).context("invalid skill.toml")?;

        let capability = std::fs::read_to_string(dir.join("capability.md")).unwrap_or_default();

        Ok(Some(Skill {
            meta: skill_data.skill,
            capability,
            dir: dir.to_path_buf(),
        }))
    }

    pub async fn get(&self, id: &str) -> Option<Skill> {
        self.cache.read().await.get(id).cloned()
    }

    pub async fn contains(&self, id: &str) -> bool {
        self.cache.read().await.contains_key(id)
    }

    /// 所有技能的摘要列表（按 id 排序）
    pub async fn list_summaries(&self) -> Vec<String> {
        self.cache.read().await.values().map(|s| s.summary()).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_skill(root: &Path, id: &str, tools: &str) {
        let dir = root.join(id);
        std::fs::create_dir_all(&dir).unwrap();
        std::fs::write(
            dir.join("skill.toml"),
            format!(
                "[skill]\nid = \"{id}\"\nname = \"{id} skill\"\ndescription = \"does {id}\"\ntools = [{tools}]\n"
            ),
        )
        .unwrap();
        std::fs::write(dir.join("capability.md"), format!("You are good at {id}.")).unwrap();
    }

    #[tokio::test]
    async fn test_load_all_from_dir() {
        let root = tempfile::tempdir().unwrap();
        write_skill(root.path(), "s3", "\"list_buckets\"");
        write_skill(root.path(), "iam", "");
        std::fs::create_dir_all(root.path().join("not_a_skill")).unwrap();

        let loader = SkillLoader::new(root.path());
        let skills = loader.load_all().await.unwrap();
        assert_eq!(skills.len(), 2);

        let s3 = loader.get("s3").await.unwrap();
        assert_eq!(s3.allowed_tools(), ["list_buckets".to_string()]);
        assert!(s3.full_capability().contains("good at s3"));
        assert!(loader.get("iam").await.unwrap().allowed_tools().is_empty());
        assert_eq!(loader.list_summaries().await.len(), 2);
    }

    #[tokio::test]
    async fn test_missing_dir_is_empty() {
        let loader = SkillLoader::new("/no/such/skills");
        assert!(loader.load_all().await.unwrap().is_empty());
        assert!(!loader.contains("anything").await);
    }
}
