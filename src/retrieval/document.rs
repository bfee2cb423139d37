use serde::{Deserialize, Serialize};

/// 检索单元：正文加来源
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub page_content: String,
    /// 通常是引用的 URL
    pub source: String,
}

impl Document {
    pub fn new(page_content: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            page_content: page_content.into(),
            source: source.into(),
        }
    }

    /// 渲染成写作提示中的引用块
    pub fn as_reference(&self) -> String {
        format!(
            "<Document href=\"{}\"/>\n{}\n</Document>",
            self.source, self.page_content
        )
    }
}
