mod console;

use std::{
    io::Write,
    sync::{Arc, Mutex},
};

use tokio::{
    io::{AsyncBufReadExt, BufReader, Lines, Stdin},
    task::JoinHandle,
};
use tokio_util::sync::CancellationToken;

use tgpanel_core::{
    api::ApiClient,
    config::Config,
    dashboard::{DashboardService, DashboardStats},
    domain::LoginCredentials,
    router::{route, Screen, Tab},
    session::{AuthSession, CodeOutcome},
    token_store::FileTokenStore,
};
use tgpanel_http::ReqwestTransport;

use console::{parse_command, render_screen, render_tab, Command, HELP};

type Input = Lines<BufReader<Stdin>>;
type SharedStats = Arc<Mutex<Option<DashboardStats>>>;

struct Refresh {
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl Refresh {
    async fn stop(self) {
        self.cancel.cancel();
        let _ = self.handle.await;
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tgpanel_core::logging::init("tgpanel")?;

    let cfg = Config::load()?;
    let store = Arc::new(FileTokenStore::new(cfg.token_file.clone()));
    let transport = Arc::new(ReqwestTransport::new(cfg.api_timeout)?);
    let api = Arc::new(ApiClient::new(&cfg, transport, store.clone()));
    let session = AuthSession::new(api.clone(), store);
    let dashboard = DashboardService::new(api.clone());

    println!("tgpanel started: {}", cfg.api_base_url);
    if let Err(e) = api.health().await {
        tracing::warn!(error = %e, "backend health check failed");
    }

    println!("{}", render_screen(&Screen::Loading, &session.snapshot().await));
    session.resume().await?;

    let mut input = BufReader::new(tokio::io::stdin()).lines();
    let stats: SharedStats = Arc::new(Mutex::new(None));
    let mut refresh: Option<Refresh> = None;
    let mut tab = Tab::default();

    loop {
        let snap = session.snapshot().await;
        let screen = route(&snap, tab);

        match (&screen, refresh.is_some()) {
            (Screen::Dashboard { .. }, false) => {
                let cancel = CancellationToken::new();
                let shared = stats.clone();
                let handle = dashboard.spawn_refresh(
                    cfg.dashboard_refresh,
                    cancel.clone(),
                    move |fresh| {
                        if let Ok(mut slot) = shared.lock() {
                            *slot = Some(fresh);
                        }
                    },
                );
                refresh = Some(Refresh { cancel, handle });
            }
            (Screen::Dashboard { .. }, true) => {}
            (_, true) => {
                if let Some(r) = refresh.take() {
                    r.stop().await;
                }
                clear_stats(&stats);
                tab = Tab::default();
            }
            (_, false) => {}
        }

        tracing::debug!(screen = screen.name(), step = %snap.step, "render");
        print!("{}", render_screen(&screen, &snap));

        let keep_going = match screen {
            Screen::Loading => true,
            Screen::Login => login_screen(&session, &mut input).await?,
            Screen::CodeVerification { .. } => code_screen(&session, &mut input).await?,
            Screen::TwoFactor { .. } => two_factor_screen(&session, &mut input).await?,
            Screen::Dashboard { tab: current, .. } => {
                let snapshot = stats.lock().ok().and_then(|s| s.clone());
                print!("{}", render_tab(current, snapshot.as_ref()));
                dashboard_screen(&session, &dashboard, &stats, &mut tab, &mut input).await?
            }
        };
        if !keep_going {
            break;
        }
    }

    if let Some(r) = refresh.take() {
        r.stop().await;
    }
    println!("bye");
    Ok(())
}

/// Prompt for one line. `None` on end of input.
async fn prompt(input: &mut Input, label: &str) -> anyhow::Result<Option<String>> {
    print!("{label}: ");
    std::io::stdout().flush()?;
    Ok(input.next_line().await?)
}

/// Errors the session already records in `last_error` are rendered with the
/// next screen; the rest are printed here.
fn report(e: &tgpanel_core::Error) {
    match e {
        tgpanel_core::Error::Busy | tgpanel_core::Error::InvalidStep { .. } => {
            eprintln!("! {e}");
        }
        _ => tracing::debug!(error = %e, "action failed"),
    }
}

async fn login_screen(session: &AuthSession, input: &mut Input) -> anyhow::Result<bool> {
    let Some(phone_number) = prompt(input, "Phone number").await? else {
        return Ok(false);
    };
    let Some(api_id) = prompt(input, "API ID").await? else {
        return Ok(false);
    };
    let Some(api_hash) = prompt(input, "API hash").await? else {
        return Ok(false);
    };

    let creds = LoginCredentials {
        phone_number,
        api_id,
        api_hash,
    };
    match session.login(&creds).await {
        Ok(Some(msg)) => println!("{msg}"),
        Ok(None) => {}
        Err(e) => report(&e),
    }
    Ok(true)
}

async fn code_screen(session: &AuthSession, input: &mut Input) -> anyhow::Result<bool> {
    let Some(code) = prompt(input, "Code").await? else {
        return Ok(false);
    };
    if code.trim().is_empty() {
        if let Err(e) = session.reset().await {
            report(&e);
        }
        return Ok(true);
    }

    match session.verify_code(&code).await {
        Ok(CodeOutcome::Authenticated(user)) => {
            println!("Welcome, {}", user.display_name());
        }
        Ok(CodeOutcome::TwoFactorRequired { message }) => {
            if let Some(msg) = message {
                println!("{msg}");
            }
        }
        Err(e) => report(&e),
    }
    Ok(true)
}

async fn two_factor_screen(session: &AuthSession, input: &mut Input) -> anyhow::Result<bool> {
    let Some(password) = prompt(input, "Password").await? else {
        return Ok(false);
    };
    if password.is_empty() {
        if let Err(e) = session.reset().await {
            report(&e);
        }
        return Ok(true);
    }

    match session.verify_2fa(&password).await {
        Ok(user) => println!("Welcome, {}", user.display_name()),
        Err(e) => report(&e),
    }
    Ok(true)
}

async fn dashboard_screen(
    session: &AuthSession,
    dashboard: &DashboardService,
    stats: &SharedStats,
    tab: &mut Tab,
    input: &mut Input,
) -> anyhow::Result<bool> {
    let Some(line) = prompt(input, "tgpanel>").await? else {
        return Ok(false);
    };

    match parse_command(&line) {
        Command::Tab(t) => *tab = t,
        Command::Refresh => {
            let fresh = dashboard.fetch_stats().await;
            if let Ok(mut slot) = stats.lock() {
                *slot = Some(fresh);
            }
        }
        Command::Toggle => {
            let running = stats
                .lock()
                .ok()
                .and_then(|s| s.as_ref().map(DashboardStats::scheduler_running));
            let Some(running) = running else {
                println!("Scheduler status not loaded yet; try `refresh`.");
                return Ok(true);
            };
            match dashboard.toggle_scheduler(running).await {
                Ok(status) => {
                    if let Ok(mut slot) = stats.lock() {
                        if let Some(s) = slot.as_mut() {
                            s.scheduler = Some(status);
                        }
                    }
                }
                Err(e) => eprintln!("! {e}"),
            }
        }
        Command::Logout => {
            if let Err(e) = session.logout().await {
                report(&e);
            }
        }
        Command::Quit => return Ok(false),
        Command::Help => println!("{HELP}"),
        Command::Unknown(msg) => println!("{msg}"),
    }
    Ok(true)
}

fn clear_stats(stats: &SharedStats) {
    if let Ok(mut slot) = stats.lock() {
        *slot = None;
    }
}
