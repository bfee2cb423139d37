use serde::de::DeserializeOwned;
use tracing::warn;

use crate::chain::{JsonOutputParser, PromptTemplate};
use crate::error::Result;
use crate::llm::{ChatMessage, ChatRequest, DynChatModel};

const JSON_ATTEMPTS: usize = 2;

pub const OUTLINE_SYSTEM: PromptTemplate = PromptTemplate::new(
    "You are a Wikipedia writer. Write an outline for a Wikipedia page about a user-provided topic. \
Be comprehensive and specific.\n\n\
Respond with JSON only, shaped as {{\"page_title\": str, \"sections\": [{{\"section_title\": str, \
\"description\": str, \"subsections\": [{{\"subsection_title\": str, \"description\": str}}]}}]}}.",
);

pub const OUTLINE_USER: PromptTemplate = PromptTemplate::new("{topic}");

pub const RELATED_SUBJECTS: PromptTemplate = PromptTemplate::new(
    "I'm writing a Wikipedia page for a topic mentioned below. Please identify and recommend some \
Wikipedia pages on closely related subjects. I'm looking for examples that provide insights into \
interesting aspects commonly associated with this topic, or examples that help me understand the \
typical content and structure included in Wikipedia pages for similar topics.\n\n\
Please list as many subjects as you can.\n\n\
Respond with JSON only, shaped as {{\"topics\": [str]}}.\n\n\
Topic of interest: {topic}",
);

pub const PERSPECTIVES_SYSTEM: PromptTemplate = PromptTemplate::new(
    "You need to select a diverse (and distinct) group of Wikipedia editors who will work together \
to create a comprehensive article on the topic. Each of them represents a different perspective, \
role, or affiliation related to this topic. You can use other Wikipedia pages of related topics \
for inspiration. For each editor, add a description of what they will focus on.\n\n\
Wiki page outlines of related topics for inspiration:\n{examples}\n\n\
Respond with JSON only, shaped as {{\"editors\": [{{\"affiliation\": str, \"name\": str, \
\"role\": str, \"description\": str}}]}}. Names may only use letters, digits, '_' and '-'.",
);

pub const PERSPECTIVES_USER: PromptTemplate = PromptTemplate::new("Topic of interest: {topic}");

pub const QUESTION_SYSTEM: PromptTemplate = PromptTemplate::new(
    "You are an experienced Wikipedia writer and want to edit a specific page. Besides your \
identity as a Wikipedia writer, you have a specific focus when researching the topic. Now, you \
are chatting with an expert to get information. Ask good questions to get more useful \
information.\n\n\
When you have no more questions to ask, say \"Thank you so much for your help!\" to end the \
conversation. Please only ask one question at a time and don't ask what you have asked before. \
Your questions should be related to the topic you want to write. Be comprehensive and curious, \
gaining as much unique insight from the expert as possible.\n\n\
Stay true to your specific perspective:\n\n{persona}",
);

pub const QUERIES_SYSTEM: PromptTemplate = PromptTemplate::new(
    "You are a helpful research assistant. Query the search engine to answer the user's \
questions.\n\n\
Respond with JSON only, shaped as {{\"queries\": [str]}}.",
);

pub const ANSWER_SYSTEM: PromptTemplate = PromptTemplate::new(
    "You are an expert who can use information effectively. You are chatting with a Wikipedia \
writer who wants to write a Wikipedia page on the topic you know. You have gathered the related \
information and will now use the information to form a response.\n\n\
Make your response as informative as possible and make sure every sentence is supported by the \
gathered information. Each response must be backed up by a citation from a reliable source, \
formatted as a footnote, reproducing the URLS after your response.\n\n\
Gathered information:\n\n{results}\n\n\
Respond with JSON only, shaped as {{\"answer\": str, \"cited_urls\": [str]}}.",
);

pub const REFINE_SYSTEM: PromptTemplate = PromptTemplate::new(
    "You are a Wikipedia writer. You have gathered information from experts and search engines. \
Now, you are refining the outline of the Wikipedia page. You need to make sure that the outline \
is comprehensive and specific. Topic you are writing about: {topic}\n\n\
Old outline:\n\n{old_outline}\n\n\
Respond with JSON only, using the same shape as the outline: {{\"page_title\": str, \
\"sections\": [{{\"section_title\": str, \"description\": str, \"subsections\": \
[{{\"subsection_title\": str, \"description\": str}}]}}]}}.",
);

pub const REFINE_USER: PromptTemplate = PromptTemplate::new(
    "Refine the outline based on your conversations with subject-matter experts:\n\n\
Conversations:\n\n{conversations}\n\n\
Write the refined Wikipedia outline:",
);

pub const SECTION_SYSTEM: PromptTemplate = PromptTemplate::new(
    "You are an expert Wikipedia writer. Complete your assigned WikiSection from the following \
outline:\n\n{outline}\n\n\
Cite your sources, using the following references:\n\n<Documents>\n{docs}\n</Documents>\n\n\
Respond with JSON only, shaped as {{\"section_title\": str, \"content\": str, \"subsections\": \
[{{\"subsection_title\": str, \"content\": str}}], \"citations\": [str]}}.",
);

pub const SECTION_USER: PromptTemplate =
    PromptTemplate::new("Write the full WikiSection for the {section} section.");

pub const ARTICLE_SYSTEM: PromptTemplate = PromptTemplate::new(
    "You are an expert Wikipedia author. Write the complete wiki article on {topic} using the \
following section drafts:\n\n{draft}\n\n\
Strictly follow Wikipedia format guidelines.",
);

pub const ARTICLE_USER: PromptTemplate = PromptTemplate::new(
    "Write the complete Wiki article using markdown format. Organize citations using footnotes \
like \"[1]\", avoiding duplicates in the footer. Include URLs in the footer.",
);

/// 系统提示 + 单条用户消息
pub fn system_and_user(system: String, user: String) -> Vec<ChatMessage> {
    vec![ChatMessage::system(system), ChatMessage::user(user)]
}

pub async fn complete_text(model: &DynChatModel, messages: Vec<ChatMessage>) -> Result<String> {
    let response = model.complete(ChatRequest::new(messages)).await?;
    Ok(response.content.trim().to_string())
}

/// 请求结构化输出；解析失败时重试一次
pub async fn complete_json<T: DeserializeOwned>(
    model: &DynChatModel,
    messages: Vec<ChatMessage>,
) -> Result<T> {
    let parser = JsonOutputParser::<T>::new();
    let mut attempt = 1;
    loop {
        let response = model.complete(ChatRequest::new(messages.clone())).await?;
        match parser.parse(&response.content) {
            Ok(value) => return Ok(value),
            Err(e) if attempt < JSON_ATTEMPTS => {
                warn!(attempt, error = %e, "structured output did not parse, retrying");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
