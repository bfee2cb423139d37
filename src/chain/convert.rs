use std::collections::HashMap;
use std::path::Path;

use once_cell::sync::Lazy;
use zhconv::{zhconv, Variant};

use crate::error::{Result, StormFlowError};

static S2HK: Lazy<ChineseConverter> = Lazy::new(ChineseConverter::s2hk);

/// 简体 → 繁体（香港）转换
pub fn s2hk(content: &str) -> String {
    S2HK.convert(content)
}

/// 中文字形转换
///
/// 自定义词典优先（词组最长匹配，其次单字）；未命中的片段交给 `zhconv` 的目标地区变体。
#[derive(Debug, Clone, Default)]
pub struct ChineseConverter {
    target: Option<Variant>,
    chars: HashMap<char, String>,
    phrases: HashMap<String, String>,
    max_phrase_len: usize,
}

impl ChineseConverter {
    /// 简体 → 香港繁体
    pub fn s2hk() -> Self {
        Self::with_target(Variant::ZhHK)
    }

    pub fn with_target(target: Variant) -> Self {
        Self {
            target: Some(target),
            ..Self::default()
        }
    }

    /// 从 OpenCC 格式的词典文件追加条目
    pub fn from_opencc_files<P: AsRef<Path>>(paths: &[P]) -> Result<Self> {
        let mut converter = Self::default();
        for path in paths {
            let path = path.as_ref();
            let content = std::fs::read_to_string(path).map_err(|e| {
                StormFlowError::Config(format!("cannot read dictionary {}: {e}", path.display()))
            })?;
            converter.load_dictionary(&content);
        }
        Ok(converter)
    }

    /// 解析 `键\t值 [候选...]`，只取第一个候选；`#` 开头为注释
    pub fn load_dictionary(&mut self, content: &str) {
        for line in content.lines() {
            let line = line.trim_end();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, values)) = line.split_once('\t') else {
                continue;
            };
            let Some(value) = values.split_whitespace().next() else {
                continue;
            };
            self.insert(key, value);
        }
    }

    pub fn insert(&mut self, key: &str, value: &str) {
        let mut key_chars = key.chars();
        match (key_chars.next(), key_chars.next()) {
            (Some(ch), None) => {
                self.chars.insert(ch, value.to_string());
            }
            (Some(_), Some(_)) => {
                self.max_phrase_len = self.max_phrase_len.max(key.chars().count());
                self.phrases.insert(key.to_string(), value.to_string());
            }
            _ => {}
        }
    }

    pub fn len(&self) -> usize {
        self.chars.len() + self.phrases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn convert(&self, content: &str) -> String {
        if self.is_empty() {
            return self.convert_base(content);
        }

        let chars: Vec<char> = content.chars().collect();
        let mut output = String::with_capacity(content.len());
        let mut pending = String::new();
        let mut i = 0;

        while i < chars.len() {
            let longest = self.max_phrase_len.min(chars.len() - i);
            let phrase = (2..=longest).rev().find_map(|len| {
                let candidate: String = chars[i..i + len].iter().collect();
                self.phrases.get(&candidate).map(|value| (len, value))
            });
            let (len, value) = match phrase {
                Some(hit) => hit,
                None => match self.chars.get(&chars[i]) {
                    Some(value) => (1, value),
                    None => {
                        pending.push(chars[i]);
                        i += 1;
                        continue;
                    }
                },
            };
            output.push_str(&self.convert_base(&pending));
            pending.clear();
            output.push_str(value);
            i += len;
        }

        output.push_str(&self.convert_base(&pending));
        output
    }

    fn convert_base(&self, content: &str) -> String {
        match self.target {
            Some(target) if !content.is_empty() => zhconv(content, target),
            _ => content.to_string(),
        }
    }
}
