use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

pub const EXPERT_NAME: &str = "expert_bot";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Subsection {
    pub subsection_title: String,
    #[serde(default)]
    pub description: String,
}

impl Subsection {
    pub fn as_str(&self) -> String {
        format!("### {}\n\n{}", self.subsection_title, self.description)
            .trim()
            .to_string()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Section {
    pub section_title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub subsections: Vec<Subsection>,
}

impl Section {
    pub fn as_str(&self) -> String {
        let subsections = self
            .subsections
            .iter()
            .map(Subsection::as_str)
            .collect::<Vec<_>>()
            .join("\n\n");
        format!(
            "## {}\n\n{}\n\n{}",
            self.section_title, self.description, subsections
        )
        .trim()
        .to_string()
    }
}

/// 维基页面大纲
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outline {
    pub page_title: String,
    #[serde(default)]
    pub sections: Vec<Section>,
}

impl Outline {
    /// Markdown 形式
    pub fn as_str(&self) -> String {
        let sections = self
            .sections
            .iter()
            .map(Section::as_str)
            .collect::<Vec<_>>()
            .join("\n\n");
        format!("# {}\n\n{}", self.page_title, sections)
            .trim()
            .to_string()
    }
}

/// 参与访谈的编辑，代表一种视角
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Editor {
    pub affiliation: String,
    /// 仅含 `[A-Za-z0-9_-]`，用作消息的 name
    pub name: String,
    pub role: String,
    pub description: String,
}

impl Editor {
    pub fn persona(&self) -> String {
        format!(
            "Name: {}\nRole: {}\nAffiliation: {}\nDescription: {}\n",
            self.name, self.role, self.affiliation, self.description
        )
    }

    pub fn sanitized(mut self) -> Self {
        self.name = sanitize_name(&self.name);
        self
    }
}

/// 把任意名字转成合法的消息 name：非法字符替换为 `_`，最长 64 个字符
pub fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .trim()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .take(64)
        .collect();
    if cleaned.is_empty() {
        "editor".to_string()
    } else {
        cleaned
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Perspectives {
    pub editors: Vec<Editor>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RelatedSubjects {
    pub topics: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Queries {
    pub queries: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnswerWithCitations {
    pub answer: String,
    #[serde(default)]
    pub cited_urls: Vec<String>,
}

impl AnswerWithCitations {
    pub fn as_str(&self) -> String {
        let citations = self
            .cited_urls
            .iter()
            .enumerate()
            .map(|(i, url)| format!("[{}]: {url}", i + 1))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{}\n\nCitations:\n\n{citations}", self.answer)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubSection {
    pub subsection_title: String,
    pub content: String,
}

/// 写好的章节
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WikiSection {
    pub section_title: String,
    pub content: String,
    #[serde(default)]
    pub subsections: Vec<SubSection>,
    #[serde(default)]
    pub citations: Vec<String>,
}

impl WikiSection {
    pub fn as_str(&self) -> String {
        let subsections = self
            .subsections
            .iter()
            .map(|s| format!("### {}\n\n{}", s.subsection_title, s.content))
            .collect::<Vec<_>>()
            .join("\n\n");
        let body = format!("## {}\n\n{}\n\n{subsections}", self.section_title, self.content);
        let body = body.trim();
        if self.citations.is_empty() {
            return body.to_string();
        }
        let citations = self
            .citations
            .iter()
            .enumerate()
            .map(|(i, citation)| format!(" [{i}] {citation}"))
            .collect::<Vec<_>>()
            .join("\n");
        format!("{body}\n\n{}", citations.trim_start())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InterviewRole {
    Editor,
    Expert,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewMessage {
    pub name: String,
    pub role: InterviewRole,
    pub content: String,
}

impl InterviewMessage {
    pub fn expert(content: impl Into<String>) -> Self {
        Self {
            name: EXPERT_NAME.to_string(),
            role: InterviewRole::Expert,
            content: content.into(),
        }
    }

    pub fn editor(name: &str, content: impl Into<String>) -> Self {
        Self {
            name: sanitize_name(name),
            role: InterviewRole::Editor,
            content: content.into(),
        }
    }
}

/// 一场访谈的状态
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewState {
    pub editor: Editor,
    #[serde(default)]
    pub messages: Vec<InterviewMessage>,
    /// url → 内容
    #[serde(default)]
    pub references: BTreeMap<String, String>,
}

impl InterviewState {
    /// 专家先开口
    pub fn opening(editor: Editor, topic: &str) -> Self {
        Self {
            editor,
            messages: vec![InterviewMessage::expert(format!(
                "So you said you were writing an article on {topic}?"
            ))],
            references: BTreeMap::new(),
        }
    }

    /// "Conversation with {name}" 加逐行的 "name: content"
    pub fn format_conversation(&self) -> String {
        let convo = self
            .messages
            .iter()
            .map(|m| format!("{}: {}", m.name, m.content))
            .collect::<Vec<_>>()
            .join("\n");
        format!("Conversation with {}\n\n{convo}", self.editor.name)
    }

    pub fn expert_turns(&self) -> usize {
        self.messages
            .iter()
            .filter(|m| m.role == InterviewRole::Expert)
            .count()
    }
}

/// 文章生成流水线的状态
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResearchState {
    pub topic: String,
    #[serde(default)]
    pub outline: Option<Outline>,
    #[serde(default)]
    pub editors: Vec<Editor>,
    #[serde(default)]
    pub interview_results: Vec<InterviewState>,
    /// 所有访谈引用合并后的 url → 内容
    #[serde(default)]
    pub references: BTreeMap<String, String>,
    #[serde(default)]
    pub sections: Vec<WikiSection>,
    #[serde(default)]
    pub article: Option<String>,
}

impl ResearchState {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }
}
