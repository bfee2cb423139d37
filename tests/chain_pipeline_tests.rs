mod common;

use std::io::Write;

use futures::StreamExt;
use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
use serde_json::json;

use common::ScriptedModel;
use stormflow::chain::memory::HistoryEntry;
use stormflow::chain::{
    answer_with_model, create_chain, create_prompt, invoke_chain, AnswerRequest, ChatInput,
    ConversationMemory,
};
use stormflow::llm::{ChatRequest, ContentPart, LocalEchoClient, Role};

fn png_file(width: u32, height: u32) -> tempfile::NamedTempFile {
    let img = RgbImage::from_pixel(width, height, Rgb([20, 120, 220]));
    let mut bytes = std::io::Cursor::new(Vec::new());
    DynamicImage::ImageRgb8(img)
        .write_to(&mut bytes, ImageFormat::Png)
        .unwrap();
    let mut file = tempfile::Builder::new().suffix(".png").tempfile().unwrap();
    file.write_all(bytes.get_ref()).unwrap();
    file
}

fn echo_last_user(request: &ChatRequest) -> String {
    request.last_user_text().unwrap_or_default()
}

#[tokio::test]
async fn answer_converts_output_and_reports_usage() {
    let model = ScriptedModel::new("gpt-4o-mini", |_: &ChatRequest| "这是一个测试：头发很干净".to_string())
        .with_usage(1000, 500);
    let request = AnswerRequest::new("你好").with_system_prompt("You are helpful.");

    let answer = answer_with_model(model.shared(), &request).await.unwrap();

    assert_eq!(answer.text, "這是一個測試：頭髮很乾淨");
    assert_eq!(answer.usage.total_tokens, 1500);
    assert_eq!(answer.usage.successful_requests, 1);
    assert!(answer.usage.total_cost > 0.0);
    assert!(answer.usage.to_string().contains("Tokens Used: 1500"));

    let calls = model.calls();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0].messages[0].role, Role::System);
    assert_eq!(calls[0].messages[1].text(), "你好");
}

#[tokio::test]
async fn conversion_can_be_disabled() {
    let model = ScriptedModel::new("m", |_: &ChatRequest| "简体".to_string());
    let request = AnswerRequest::new("hi").with_conversion(false);
    let answer = answer_with_model(model.shared(), &request).await.unwrap();
    assert_eq!(answer.text, "简体");
    assert_eq!(answer.usage.total_cost, 0.0);
}

#[tokio::test]
async fn multimodal_input_sends_resized_jpeg_parts() {
    let file = png_file(2048, 1024);
    let path = file.path().to_string_lossy().to_string();
    let input: ChatInput = serde_json::from_value(json!({
        "text": "What is in the picture?",
        "files": [{"path": path}, 42]
    }))
    .unwrap();

    let model = ScriptedModel::new("vision", echo_last_user);
    let request = AnswerRequest::new(input)
        .with_history(vec![
            HistoryEntry::new("user", "earlier question"),
            HistoryEntry::new("assistant", "earlier answer"),
        ])
        .with_conversion(false);
    let answer = answer_with_model(model.shared(), &request).await.unwrap();

    assert_eq!(answer.text, "What is in the picture?");
    assert_eq!(answer.images.len(), 1);
    assert_eq!((answer.images[0].width, answer.images[0].height), (1024, 512));

    let sent = &model.calls()[0].messages;
    // 没有系统提示：历史两条 + 当前问题
    assert_eq!(sent.len(), 3);
    assert_eq!(sent[0].text(), "earlier question");
    assert_eq!(sent[1].role, Role::Assistant);
    let user = &sent[2];
    assert_eq!(user.parts.len(), 2);
    assert!(matches!(
        &user.parts[1],
        ContentPart::ImageUrl { url } if url.starts_with("data:image/jpeg;base64,")
    ));
}

#[tokio::test]
async fn unknown_history_role_is_rejected() {
    let model = ScriptedModel::new("m", echo_last_user);
    let request = AnswerRequest::new("hi").with_history(vec![HistoryEntry::new("tool", "x")]);
    assert!(answer_with_model(model.shared(), &request).await.is_err());
    assert!(model.calls().is_empty());
}

#[tokio::test]
async fn memory_carries_previous_turns() {
    let model = ScriptedModel::new("m", |request: &ChatRequest| {
        format!("turn {}", request.messages.len())
    });
    let memory = ConversationMemory::new();

    for question in ["first", "second"] {
        let chain = create_chain(create_prompt("", question, &[]), model.shared()).without_conversion();
        let (reply, _) = invoke_chain(&chain, &memory.messages()).await.unwrap();
        memory.save_context(question, &reply);
    }

    let messages = memory.messages();
    assert_eq!(messages.len(), 4);
    assert_eq!(messages[1].text(), "turn 1");
    assert_eq!(messages[3].text(), "turn 3");
    assert_eq!(memory.memory_key(), "chat_history");
}

#[tokio::test]
async fn streaming_chain_converts_each_chunk() {
    let model = ScriptedModel::new("m", |_: &ChatRequest| "发展".to_string());
    let chain = create_chain(create_prompt("", "go", &[]), model.shared());

    let chunks: Vec<_> = chain.stream(&[]).collect().await;
    let text: String = chunks
        .into_iter()
        .map(|chunk| chunk.unwrap().content)
        .collect();
    assert_eq!(text, "發展");
}

#[tokio::test]
async fn echo_model_answers_offline() {
    let request = AnswerRequest::new("简单问题").with_system_prompt("ignored");
    let answer = answer_with_model(std::sync::Arc::new(LocalEchoClient), &request)
        .await
        .unwrap();
    assert_eq!(answer.text, "[Echo] 簡單問題");
    assert_eq!(answer.usage.successful_requests, 1);
    assert_eq!(answer.usage.total_tokens, 0);
}
