use anyhow::Result;
use chatvault::cli::{Cli, Commands};
use chatvault::search::{ElasticsearchIndex, SearchIndex};
use chatvault::{connect, utils, ChatHistoryService, HistoryQuery, NewChatRequest, Sender, Settings};
use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::new()?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.logging.level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cli = Cli::parse();

    if let Commands::InitIndex = cli.command {
        return handle_init_index(&settings).await;
    }

    let service = connect(settings).await?;

    let result = match cli.command {
        Commands::InitIndex => Ok(()),
        Commands::Create {
            owner,
            title,
            message,
        } => handle_create(&service, owner, title, message).await,
        Commands::Append {
            owner,
            session,
            content,
            assistant,
        } => handle_append(&service, owner, session, content, assistant).await,
        Commands::List {
            owner,
            page,
            limit,
            keyword,
            start_date,
            end_date,
            sort,
            json,
        } => {
            let query = HistoryQuery {
                page,
                limit,
                keyword,
                start_date,
                end_date,
                sort,
            };
            handle_list(&service, owner, query, json).await
        }
        Commands::Show {
            owner,
            session,
            json,
        } => handle_show(&service, owner, session, json).await,
    };

    // Let queued projections land before exiting
    service.shutdown().await?;

    if let Err(e) = &result {
        tracing::error!("[Chatvault] Command failed: {}", e);
        utils::print_error(&format!("Error: {}", e));
    }
    result
}

async fn handle_init_index(settings: &Settings) -> Result<()> {
    let index = ElasticsearchIndex::new(&settings.search)?;
    index.ensure_schema().await?;
    utils::print_success(&format!("Index '{}' is ready", index.index_name()));
    Ok(())
}

async fn handle_create(
    service: &ChatHistoryService,
    owner: i64,
    title: Option<String>,
    message: Option<String>,
) -> Result<()> {
    let session = service
        .create_session(owner, NewChatRequest::new(title, message))
        .await?;
    utils::print_success(&format!("Created session {} \"{}\"", session.id, session.title));
    Ok(())
}

async fn handle_append(
    service: &ChatHistoryService,
    owner: i64,
    session: i64,
    content: String,
    assistant: bool,
) -> Result<()> {
    let sender = if assistant {
        Sender::Assistant
    } else {
        Sender::User
    };
    let message = service
        .append_message(owner, session, sender, &content)
        .await?;
    utils::print_success(&format!("Appended message {} to session {}", message.id, session));
    Ok(())
}

async fn handle_list(
    service: &ChatHistoryService,
    owner: i64,
    query: HistoryQuery,
    json: bool,
) -> Result<()> {
    let page = service.list_chat_histories(owner, &query).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&page)?);
    } else {
        utils::print_page(&page);
    }
    Ok(())
}

async fn handle_show(
    service: &ChatHistoryService,
    owner: i64,
    session: i64,
    json: bool,
) -> Result<()> {
    let detail = service.get_chat_detail(owner, session).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&detail)?);
    } else {
        utils::print_detail(&detail);
    }
    Ok(())
}
