mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures::StreamExt;
use serde_json::json;

use common::{all_text, ScriptedModel};
use stormflow::config::StormConfig;
use stormflow::graph::RunnableConfig;
use stormflow::llm::{ChatRequest, Role};
use stormflow::retrieval::{SearchEngine, SearchResult};
use stormflow::storm::{
    build_interview_graph, Editor, InterviewRole, InterviewState, Interviewer, Storm,
    EXPERT_NAME,
};
use stormflow::StormFlowError;

const OWNERSHIP_URL: &str = "https://example.com/ownership";

#[derive(Default)]
struct FakeSearch {
    queries: AtomicUsize,
}

#[async_trait]
impl SearchEngine for FakeSearch {
    async fn search(&self, _query: &str, _max_results: usize) -> stormflow::Result<Vec<SearchResult>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        Ok(vec![SearchResult {
            url: OWNERSHIP_URL.to_string(),
            content: "Ownership rules: each value has a single owner.".to_string(),
        }])
    }
}

fn outline_json(sections: &[&str]) -> String {
    json!({
        "page_title": "Rust (programming language)",
        "sections": sections
            .iter()
            .map(|title| json!({
                "section_title": title,
                "description": format!("{title} of Rust"),
                "subsections": []
            }))
            .collect::<Vec<_>>()
    })
    .to_string()
}

fn editor_turns(request: &ChatRequest) -> usize {
    request
        .messages
        .iter()
        .filter(|m| m.role == Role::Assistant)
        .count()
}

fn section_name(request: &ChatRequest) -> String {
    let user = request
        .messages
        .iter()
        .rev()
        .find(|m| m.role == Role::User)
        .map(|m| m.text())
        .unwrap_or_default();
    user.trim_start_matches("Write the full WikiSection for the ")
        .trim_end_matches(" section.")
        .to_string()
}

/// 按提示词内容应答的脚本模型
fn storm_responder(request: &ChatRequest) -> String {
    let text = all_text(request);
    if text.contains("refining the outline") {
        outline_json(&["History", "Ownership", "Ecosystem"])
    } else if text.contains("Write an outline for a Wikipedia page") {
        outline_json(&["History", "Design"])
    } else if text.contains("closely related subjects") {
        json!({"topics": ["C++", "Go (programming language)"]}).to_string()
    } else if text.contains("select a diverse (and distinct) group") {
        json!({"editors": [
            {"affiliation": "University", "name": "Dr. Ada", "role": "Historian", "description": "History of the language"},
            {"affiliation": "Industry", "name": "bob-dev", "role": "Engineer", "description": "Production usage"},
            {"affiliation": "Press", "name": "carol", "role": "Journalist", "description": "Community"}
        ]})
        .to_string()
    } else if text.contains("experienced Wikipedia writer and want to edit") {
        if editor_turns(request) == 0 {
            "How does Rust manage memory?".to_string()
        } else {
            "That is all I need. Thank you so much for your help!".to_string()
        }
    } else if text.contains("Query the search engine") {
        // 模型偶尔用代码块包裹 JSON
        format!("```json\n{}\n```", json!({"queries": ["rust ownership"]}))
    } else if text.contains("expert who can use information effectively") {
        json!({"answer": "Rust uses ownership instead of a garbage collector.", "cited_urls": [OWNERSHIP_URL, "https://not-searched.example"]}).to_string()
    } else if text.contains("Complete your assigned WikiSection") {
        let name = section_name(request);
        json!({
            "section_title": name,
            "content": format!("All about {name}."),
            "subsections": [],
            "citations": [OWNERSHIP_URL]
        })
        .to_string()
    } else if text.contains("expert Wikipedia author") {
        "# Rust\n\nRust is a systems programming language.[1]\n\n[1] https://example.com/ownership"
            .to_string()
    } else {
        panic!("unexpected prompt: {text}")
    }
}

fn storm_config() -> StormConfig {
    StormConfig {
        max_editors: 2,
        ..StormConfig::default()
    }
}

#[tokio::test]
async fn generate_article_runs_every_stage() {
    let model = ScriptedModel::new("scripted", storm_responder);
    let search = Arc::new(FakeSearch::default());
    let storm = Storm::builder(model.shared())
        .search(search.clone())
        .config(storm_config())
        .build()
        .unwrap();

    let article = storm.generate_article("Rust").await.unwrap();
    assert!(article.starts_with("# Rust"));

    let state = storm
        .graph()
        .get_state(&RunnableConfig::new("my-thread"))
        .await
        .unwrap()
        .unwrap();
    assert_eq!(state.next, None);
    let values = state.values;
    assert_eq!(values.article.as_deref(), Some(article.as_str()));

    // 编辑数量截断到 max_editors，名字被清洗
    let names: Vec<_> = values.editors.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["Dr__Ada", "bob-dev"]);

    // 每场访谈：开场 → 提问 → 回答 → 道谢 → 回答
    assert_eq!(values.interview_results.len(), 2);
    for interview in &values.interview_results {
        let first = &interview.messages[0];
        assert_eq!(first.name, EXPERT_NAME);
        assert_eq!(first.content, "So you said you were writing an article on Rust?");
        assert_eq!(interview.messages.len(), 5);
        assert_eq!(interview.messages[1].role, InterviewRole::Editor);
        assert_eq!(interview.messages[1].name, interview.editor.name);
        assert!(interview.messages[2].content.contains("Citations:\n\n[1]: https://example.com/ownership"));
        // 只保留搜索结果中出现过的引用
        assert_eq!(interview.references.len(), 1);
        assert!(interview.references.contains_key(OWNERSHIP_URL));
    }

    let refined = values.outline.unwrap();
    assert_eq!(refined.sections.len(), 3);
    let titles: Vec<_> = values.sections.iter().map(|s| s.section_title.as_str()).collect();
    assert_eq!(titles, vec!["History", "Ownership", "Ecosystem"]);
    assert_eq!(values.references.len(), 1);
    assert!(values.references.contains_key(OWNERSHIP_URL));
    assert!(search.queries.load(Ordering::SeqCst) >= 4);

    let calls = model.calls();
    let refine = calls
        .iter()
        .map(all_text)
        .find(|text| text.contains("refining the outline"))
        .unwrap();
    assert!(refine.contains("Conversation with Dr__Ada\n\nexpert_bot: So you said you were writing an article on Rust?"));
    assert!(refine.contains("Conversation with bob-dev"));

    let section_prompt = calls
        .iter()
        .map(all_text)
        .find(|text| text.contains("Complete your assigned WikiSection"))
        .unwrap();
    assert!(section_prompt.contains("<Document href=\"https://example.com/ownership\"/>"));

    let article_prompt = calls
        .iter()
        .map(all_text)
        .find(|text| text.contains("expert Wikipedia author"))
        .unwrap();
    assert!(article_prompt.contains("## History\n\nAll about History.\n\n[0] https://example.com/ownership"));
    assert!(article_prompt.contains("## Ecosystem"));
}

#[tokio::test]
async fn stream_reports_the_six_stages_in_order() {
    let model = ScriptedModel::new("scripted", storm_responder);
    let storm = Storm::builder(model.shared())
        .config(storm_config())
        .build()
        .unwrap();

    let events: Vec<_> = storm
        .stream("Rust", &RunnableConfig::new("stream"))
        .map(|event| event.unwrap())
        .collect()
        .await;
    let nodes: Vec<&str> = events.iter().map(|event| event.node.as_str()).collect();
    assert_eq!(
        nodes,
        vec![
            "init_research",
            "conduct_interviews",
            "refine_outline",
            "index_references",
            "write_sections",
            "write_article"
        ]
    );
    // 没有搜索引擎时访谈没有引用
    let last = events.last().unwrap();
    assert!(last.state.references.is_empty());
    assert!(last.state.article.is_some());
}

#[tokio::test]
async fn interviews_stop_at_the_turn_limit() {
    let model = ScriptedModel::new("curious", |request: &ChatRequest| {
        let text = all_text(request);
        if text.contains("experienced Wikipedia writer and want to edit") {
            "And what else?".to_string()
        } else if text.contains("Query the search engine") {
            json!({"queries": []}).to_string()
        } else {
            json!({"answer": "More facts.", "cited_urls": []}).to_string()
        }
    });
    let interviewer = Interviewer::new(model.shared(), Arc::new(FakeSearch::default()), 2, 3);
    let graph = build_interview_graph(Arc::new(interviewer)).unwrap();

    let editor = Editor {
        affiliation: "Lab".into(),
        name: "dana".into(),
        role: "Researcher".into(),
        description: "Details".into(),
    };
    let result = graph
        .invoke(InterviewState::opening(editor, "Rust"), &RunnableConfig::default())
        .await
        .unwrap();

    assert_eq!(result.expert_turns(), 2);
    assert_eq!(result.messages.len(), 3);
    assert!(result.messages[2].content.starts_with("More facts."));
    assert!(result.references.is_empty());
}

#[tokio::test]
async fn interrupted_run_resumes_from_the_next_stage() {
    let model = ScriptedModel::new("scripted", storm_responder);
    let storm = Storm::builder(model.shared())
        .config(storm_config())
        .build()
        .unwrap();
    let config = RunnableConfig::new("resumable");

    // 在 write_sections 之后丢弃流，模拟中断
    let mut events = storm.stream("Rust", &config);
    while let Some(event) = events.next().await {
        if event.unwrap().node == "write_sections" {
            break;
        }
    }
    drop(events);

    let snapshot = storm.graph().get_state(&config).await.unwrap().unwrap();
    assert_eq!(snapshot.next.as_deref(), Some("write_article"));
    assert_eq!(snapshot.step, 5);
    assert!(snapshot.values.article.is_none());
    assert_eq!(snapshot.values.sections.len(), 3);

    let article_calls = |model: &ScriptedModel| {
        model
            .calls()
            .iter()
            .filter(|request| all_text(request).contains("expert Wikipedia author"))
            .count()
    };
    assert_eq!(article_calls(&model), 0);

    let state = storm.graph().resume(&config).await.unwrap();
    assert!(state.article.unwrap().starts_with("# Rust"));
    assert_eq!(article_calls(&model), 1);
}

/// 按查询返回 `https://example.com/{query}` 的搜索引擎
struct EchoSearch;

#[async_trait]
impl SearchEngine for EchoSearch {
    async fn search(&self, query: &str, _max_results: usize) -> stormflow::Result<Vec<SearchResult>> {
        Ok(vec![SearchResult {
            url: format!("https://example.com/{query}"),
            content: format!("{query} facts"),
        }])
    }
}

/// 查询与引用都随主题变化，章节内容标明检索到的是哪个主题的文档
fn per_topic_responder(request: &ChatRequest) -> String {
    let text = all_text(request);
    if text.contains("Query the search engine") {
        let topic = if text.contains("Apples") { "Apples" } else { "Bananas" };
        json!({"queries": [topic]}).to_string()
    } else if text.contains("expert who can use information effectively") {
        let topic = if text.contains("Apples") { "Apples" } else { "Bananas" };
        json!({"answer": format!("{topic} are fruit."), "cited_urls": [format!("https://example.com/{topic}")]})
            .to_string()
    } else if text.contains("Complete your assigned WikiSection") {
        let apples = text.contains("href=\"https://example.com/Apples\"");
        let bananas = text.contains("href=\"https://example.com/Bananas\"");
        let content = match (apples, bananas) {
            (true, false) => "Apples docs",
            (false, true) => "Bananas docs",
            (true, true) => "mixed docs",
            (false, false) => "no docs",
        };
        json!({
            "section_title": section_name(request),
            "content": content,
            "subsections": [],
            "citations": []
        })
        .to_string()
    } else {
        storm_responder(request)
    }
}

#[tokio::test]
async fn runs_on_different_threads_keep_their_own_references() {
    let model = ScriptedModel::new("scripted", per_topic_responder);
    let storm = Storm::builder(model.shared())
        .search(Arc::new(EchoSearch))
        .config(storm_config())
        .build()
        .unwrap();
    let apples = RunnableConfig::new("apples");

    // Apples 停在 index_references 之后
    let mut events = storm.stream("Apples", &apples);
    while let Some(event) = events.next().await {
        if event.unwrap().node == "index_references" {
            break;
        }
    }
    drop(events);

    storm
        .generate_article_with("Bananas", &RunnableConfig::new("bananas"))
        .await
        .unwrap();
    let bananas = storm
        .graph()
        .get_state(&RunnableConfig::new("bananas"))
        .await
        .unwrap()
        .unwrap()
        .values;
    assert!(bananas.sections.iter().all(|s| s.content == "Bananas docs"));

    let finished = storm.graph().resume(&apples).await.unwrap();
    let urls: Vec<_> = finished.references.keys().map(String::as_str).collect();
    assert_eq!(urls, vec!["https://example.com/Apples"]);
    assert_eq!(finished.sections.len(), 3);
    assert!(finished.sections.iter().all(|s| s.content == "Apples docs"));
}

#[test]
fn invalid_config_is_rejected() {
    let model = ScriptedModel::new("unused", |_: &ChatRequest| String::new());
    let result = Storm::builder(model.shared())
        .config(StormConfig {
            max_interview_turns: 0,
            ..StormConfig::default()
        })
        .build();
    assert!(matches!(result, Err(StormFlowError::Config(_))));
}
