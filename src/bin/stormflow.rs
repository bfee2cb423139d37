use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};

use stormflow::chain::answer::{DEFAULT_MODEL, DEFAULT_PROVIDER};
use stormflow::chain::{create_chain, create_prompt, invoke_chain, ConversationMemory};
use stormflow::config::{EnvConfig, ModelSettings, StormConfig};
use stormflow::graph::RunnableConfig;
use stormflow::llm::{select_model, DynChatModel, LocalEchoClient};
use stormflow::storm::{Storm, DEFAULT_THREAD_ID};
use stormflow::utils::LoggingConfig;
use stormflow::{answer_with_model, get_answer, AnswerRequest, ChatInput};

#[derive(Parser)]
#[command(name = "stormflow", version, about = "Multi-provider LLM chains and topic-to-article generation", author)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone)]
struct ModelArgs {
    /// OpenAI | AzureOpenAI | OpenRouter | Together | Google
    #[arg(long, default_value = DEFAULT_PROVIDER)]
    provider: String,
    #[arg(long, default_value = DEFAULT_MODEL)]
    model: String,
    #[arg(long)]
    temperature: Option<f32>,
    #[arg(long)]
    max_tokens: Option<u32>,
}

impl ModelArgs {
    fn settings(&self, base: ModelSettings) -> ModelSettings {
        let mut settings = base;
        if let Some(temperature) = self.temperature {
            settings = settings.with_temperature(temperature);
        }
        if let Some(max_tokens) = self.max_tokens {
            settings = settings.with_max_tokens(max_tokens);
        }
        settings
    }

    /// 试运行时使用本地回显模型，不访问网络
    fn chat_model(&self, settings: &ModelSettings, dry_run: bool) -> anyhow::Result<DynChatModel> {
        if dry_run {
            return Ok(Arc::new(LocalEchoClient));
        }
        Ok(select_model(Some(self.provider.as_str()), &self.model, settings)?)
    }
}

#[derive(Subcommand)]
enum Command {
    /// 单次问答，可附带图片
    Ask {
        text: String,
        #[arg(long = "image")]
        images: Vec<String>,
        #[arg(long, default_value = "")]
        system: String,
        #[command(flatten)]
        model: ModelArgs,
        /// 不转换为香港繁体
        #[arg(long)]
        no_convert: bool,
        /// 用本地回显模型代替真实服务
        #[arg(long)]
        dry_run: bool,
    },
    /// 交互式对话，保留历史
    Chat {
        #[arg(long, default_value = "")]
        system: String,
        #[command(flatten)]
        model: ModelArgs,
        #[arg(long)]
        no_convert: bool,
        #[arg(long)]
        dry_run: bool,
    },
    /// 生成维基风格文章
    Article {
        topic: String,
        #[command(flatten)]
        model: ModelArgs,
        #[arg(long, default_value = DEFAULT_THREAD_ID)]
        thread_id: String,
        /// JSON 格式的流水线配置
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    EnvConfig::load_dotenv();
    LoggingConfig::init();

    let cli = Cli::parse();
    match cli.command {
        Command::Ask {
            text,
            images,
            system,
            model,
            no_convert,
            dry_run,
        } => handle_ask(text, images, system, model, !no_convert, dry_run).await?,
        Command::Chat {
            system,
            model,
            no_convert,
            dry_run,
        } => handle_chat(system, model, !no_convert, dry_run).await?,
        Command::Article {
            topic,
            model,
            thread_id,
            config,
            output,
        } => handle_article(topic, model, thread_id, config, output).await?,
    }
    Ok(())
}

async fn handle_ask(
    text: String,
    images: Vec<String>,
    system: String,
    model: ModelArgs,
    convert: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let input = if images.is_empty() {
        ChatInput::from(text)
    } else {
        ChatInput::with_files(text, images)
    };
    let request = AnswerRequest::new(input)
        .with_system_prompt(system)
        .with_model(Some(model.provider.clone()), model.model.clone())
        .with_settings(model.settings(ModelSettings::default()))
        .with_conversion(convert);

    let answer = if dry_run {
        answer_with_model(Arc::new(LocalEchoClient), &request).await?
    } else {
        get_answer(&request).await?
    };
    for (index, image) in answer.images.iter().enumerate() {
        println!("image {index}: {}x{}", image.width, image.height);
    }
    println!("{}\n", answer.text);
    println!("{}", answer.usage);
    Ok(())
}

async fn handle_chat(
    system: String,
    model: ModelArgs,
    convert: bool,
    dry_run: bool,
) -> anyhow::Result<()> {
    let settings = model.settings(ModelSettings::default());
    let chat_model = model.chat_model(&settings, dry_run)?;
    let memory = ConversationMemory::new();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    println!("Chatting with {} ({}). Type `exit` to quit, `clear` to reset.", model.model, model.provider);

    loop {
        stdout.write_all(b"> ").await?;
        stdout.flush().await?;
        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();
        match line {
            "" => continue,
            "exit" | "quit" => break,
            "clear" => {
                memory.clear();
                println!("(history cleared)");
                continue;
            }
            _ => {}
        }

        let prompt = create_prompt(&system, line, &[]);
        let mut chain = create_chain(prompt, chat_model.clone());
        if !convert {
            chain = chain.without_conversion();
        }
        match invoke_chain(&chain, &memory.messages()).await {
            Ok((reply, usage)) => {
                println!("{reply}");
                tracing::debug!(total_tokens = usage.total_tokens, "turn finished");
                memory.save_context(line, &reply);
            }
            Err(e) => eprintln!("error: {e}"),
        }
    }
    Ok(())
}

async fn handle_article(
    topic: String,
    model: ModelArgs,
    thread_id: String,
    config: Option<PathBuf>,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let storm_config = match &config {
        Some(path) => StormConfig::from_file(path)?,
        None => StormConfig::default(),
    };
    let settings = model.settings(storm_config.model.clone());
    let chat_model = model.chat_model(&settings, false)?;

    let builder = Storm::builder(chat_model).config(storm_config);
    #[cfg(feature = "http-providers")]
    let builder = match stormflow::retrieval::TavilySearch::from_env() {
        Ok(search) => builder.search(Arc::new(search)),
        Err(_) => {
            tracing::warn!("TAVILY_API_KEY not set, interviews run without web search");
            builder
        }
    };
    let storm = builder.build()?;

    let article = storm
        .generate_article_with(&topic, &RunnableConfig::new(thread_id))
        .await?;

    match output {
        Some(path) => {
            fs::write(&path, &article)?;
            println!("Article written to `{}`", path.display());
        }
        None => println!("{article}"),
    }
    Ok(())
}
