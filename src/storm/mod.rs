// Storm 模块：从主题到维基风格长文的多阶段流水线

pub mod interview;
pub mod models;
pub mod orchestrator;
pub mod outline;
pub mod prompts;
pub mod writer;

pub use interview::{build_interview_graph, route_messages, Interviewer};
pub use models::{
    sanitize_name, AnswerWithCitations, Editor, InterviewMessage, InterviewRole, InterviewState,
    Outline, Perspectives, Queries, RelatedSubjects, ResearchState, Section, SubSection,
    Subsection, WikiSection, EXPERT_NAME,
};
pub use orchestrator::{merge_references, Storm, StormBuilder, DEFAULT_THREAD_ID};
pub use outline::{format_conversations, generate_initial_outline, refine_outline, survey_subjects};
pub use writer::{draft_from_sections, index_references, section_query, write_article, write_section};
