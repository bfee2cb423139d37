use super::chain::{create_chain, invoke_chain};
use super::image::{display_images, ImageSummary};
use super::input::{process_input, ChatInput};
use super::memory::{history_messages, HistoryEntry};
use super::prompt::create_prompt;
use crate::config::ModelSettings;
use crate::error::Result;
use crate::llm::{select_model, DynChatModel, UsageSnapshot};

pub const DEFAULT_PROVIDER: &str = "OpenAI";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

/// 一次问答所需的全部输入
#[derive(Debug, Clone)]
pub struct AnswerRequest {
    pub input: ChatInput,
    pub history: Vec<HistoryEntry>,
    pub system_prompt: String,
    pub provider: Option<String>,
    pub model_name: String,
    pub settings: ModelSettings,
    /// 输出是否转换为香港繁体
    pub convert: bool,
}

impl AnswerRequest {
    pub fn new(input: impl Into<ChatInput>) -> Self {
        Self {
            input: input.into(),
            history: Vec::new(),
            system_prompt: String::new(),
            provider: Some(DEFAULT_PROVIDER.to_string()),
            model_name: DEFAULT_MODEL.to_string(),
            settings: ModelSettings::default(),
            convert: true,
        }
    }

    pub fn with_history(mut self, history: Vec<HistoryEntry>) -> Self {
        self.history = history;
        self
    }

    pub fn with_system_prompt(mut self, system_prompt: impl Into<String>) -> Self {
        self.system_prompt = system_prompt.into();
        self
    }

    pub fn with_model(mut self, provider: Option<String>, model_name: impl Into<String>) -> Self {
        self.provider = provider;
        self.model_name = model_name.into();
        self
    }

    pub fn with_settings(mut self, settings: ModelSettings) -> Self {
        self.settings = settings;
        self
    }

    pub fn with_conversion(mut self, convert: bool) -> Self {
        self.convert = convert;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Answer {
    pub text: String,
    pub usage: UsageSnapshot,
    pub images: Vec<ImageSummary>,
}

/// 选择模型并回答
pub async fn get_answer(request: &AnswerRequest) -> Result<Answer> {
    let model = select_model(
        request.provider.as_deref(),
        &request.model_name,
        &request.settings,
    )?;
    answer_with_model(model, request).await
}

/// 使用给定模型回答，便于替换模型实现
pub async fn answer_with_model(model: DynChatModel, request: &AnswerRequest) -> Result<Answer> {
    let (input_text, input_images) = process_input(&request.input)?;
    let history = history_messages(&request.history)?;

    let prompt = create_prompt(&request.system_prompt, &input_text, &input_images);
    let mut chain = create_chain(prompt, model);
    if !request.convert {
        chain = chain.without_conversion();
    }

    let (text, usage) = invoke_chain(&chain, &history).await?;
    let images = display_images(&input_images);

    Ok(Answer {
        text,
        usage,
        images,
    })
}
