use crate::core::{Sender, SessionDetail};
use crate::router::HistoryPage;
use chrono::{DateTime, Utc};
use colored::*;

pub fn print_header(text: &str) {
    println!("\n{}", text.bright_cyan().bold());
    println!("{}", "=".repeat(text.len()).bright_cyan());
}

pub fn print_success(text: &str) {
    println!("{}", text.green());
}

pub fn print_error(text: &str) {
    eprintln!("{}", text.red().bold());
}

pub fn print_info(text: &str) {
    println!("{}", text.blue());
}

pub fn print_warning(text: &str) {
    eprintln!("{}", text.yellow().bold());
}

fn timestamp(at: &DateTime<Utc>) -> String {
    at.format("%Y-%m-%d %H:%M").to_string()
}

pub fn print_page(page: &HistoryPage) {
    if page.degraded {
        print_warning("Search unavailable, showing unfiltered history");
    }

    print_header(&format!(
        "Page {}/{} ({} sessions)",
        page.current_page, page.total_pages, page.total_items
    ));

    if page.chat_histories.is_empty() {
        print_info("No sessions found");
        return;
    }

    for summary in &page.chat_histories {
        println!(
            "{:>6}  {}  {}",
            summary.id.to_string().bold(),
            timestamp(&summary.last_message_at).dimmed(),
            summary.title
        );
    }
}

pub fn print_detail(detail: &SessionDetail) {
    print_header(&format!("#{} {}", detail.session.id, detail.session.title));
    print_info(&format!(
        "Created {}, last message {}",
        timestamp(&detail.session.created_at),
        timestamp(&detail.session.last_message_at)
    ));
    println!();

    for message in &detail.messages {
        let who = match message.sender {
            Sender::User => "User".yellow().bold(),
            Sender::Assistant => "Assistant".magenta().bold(),
        };
        println!("{} {}", who, timestamp(&message.created_at).dimmed());
        println!("{}\n", message.content);
    }
}
