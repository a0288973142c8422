use serde_json::Value;

use tgpanel_core::{
    dashboard::DashboardStats,
    router::{Screen, Tab},
    session::SessionSnapshot,
    utils::truncate_text,
};

/// Dashboard commands typed at the prompt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Command {
    Tab(Tab),
    Refresh,
    Toggle,
    Logout,
    Quit,
    Help,
    Unknown(String),
}

pub fn parse_command(text: &str) -> Command {
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let cmd = parts
        .next()
        .unwrap_or("")
        .trim_start_matches('/')
        .to_lowercase();
    let rest = parts.next().unwrap_or("").trim();

    match cmd.as_str() {
        "tab" => match rest.parse::<Tab>() {
            Ok(tab) => Command::Tab(tab),
            Err(e) => Command::Unknown(e),
        },
        "refresh" | "r" => Command::Refresh,
        "toggle" => Command::Toggle,
        "logout" => Command::Logout,
        "quit" | "exit" | "q" => Command::Quit,
        "help" | "?" | "" => Command::Help,
        other => Command::Unknown(format!("unknown command {other:?} (try `help`)")),
    }
}

pub const HELP: &str = "commands: tab <name>, refresh, toggle, logout, quit";

/// Header block for a screen. Field prompts are issued by the caller.
pub fn render_screen(screen: &Screen, snap: &SessionSnapshot) -> String {
    let mut out = String::new();
    match screen {
        Screen::Loading => out.push_str("Checking saved session...\n"),
        Screen::Login => {
            out.push_str("== Telegram login ==\n");
            out.push_str("Enter your phone number and API credentials from my.telegram.org.\n");
        }
        Screen::CodeVerification { phone_number } => {
            out.push_str("== Verification code ==\n");
            out.push_str(&format!("A code was sent to {phone_number}.\n"));
            out.push_str("Leave the code empty to go back.\n");
        }
        Screen::TwoFactor { phone_number } => {
            out.push_str("== Two-factor password ==\n");
            out.push_str(&format!("{phone_number} has a cloud password set.\n"));
            out.push_str("Leave the password empty to go back.\n");
        }
        Screen::Dashboard { tab, user } => {
            let tabs: Vec<String> = Tab::ALL
                .iter()
                .map(|t| {
                    if t == tab {
                        format!("[{}]", t.title())
                    } else {
                        t.title().to_string()
                    }
                })
                .collect();
            out.push_str(&format!("== tgpanel ({}) ==\n", user.display_name()));
            out.push_str(&tabs.join(" | "));
            out.push('\n');
        }
    }
    if let Some(err) = &snap.last_error {
        out.push_str(&format!("! {err}\n"));
    }
    out
}

/// Body of a dashboard tab. Tabs other than the dashboard have no content yet.
pub fn render_tab(tab: Tab, stats: Option<&DashboardStats>) -> String {
    if tab.is_placeholder() {
        return format!("{} is coming soon.\n", tab.title());
    }
    let Some(stats) = stats else {
        return "Loading statistics...\n".to_string();
    };

    let mut out = String::new();
    let scheduler = if stats.scheduler.is_none() {
        "unavailable"
    } else if stats.scheduler_running() {
        "running"
    } else {
        "stopped"
    };
    out.push_str(&format!("Scheduler: {scheduler}\n"));
    for (label, section) in [
        ("Messages", &stats.messages),
        ("Groups", &stats.groups),
        ("Blacklist", &stats.blacklist),
        ("Logs (24h)", &stats.logs),
    ] {
        out.push_str(&format!("{label}: {}\n", summarize(section.as_ref())));
    }
    out
}

fn summarize(section: Option<&Value>) -> String {
    let Some(v) = section else {
        return "unavailable".to_string();
    };
    match v {
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .filter(|(_, v)| !v.is_object() && !v.is_array())
                .map(|(k, v)| match v {
                    Value::String(s) => format!("{k}={s}"),
                    other => format!("{k}={other}"),
                })
                .collect();
            truncate_text(&parts.join(", "), 120)
        }
        other => truncate_text(&other.to_string(), 120),
    }
}
