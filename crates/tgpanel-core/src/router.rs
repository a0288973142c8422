//! Maps session state to the screen that should be shown. No logic beyond
//! the mapping itself.

use std::{fmt, str::FromStr};

use crate::{
    domain::User,
    session::{AuthStep, SessionSnapshot},
};

/// Dashboard tabs. Only [`Tab::Dashboard`] has content of its own.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum Tab {
    #[default]
    Dashboard,
    Messages,
    Groups,
    Blacklist,
    Scheduler,
    Settings,
}

impl Tab {
    pub const ALL: [Tab; 6] = [
        Tab::Dashboard,
        Tab::Messages,
        Tab::Groups,
        Tab::Blacklist,
        Tab::Scheduler,
        Tab::Settings,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Tab::Dashboard => "dashboard",
            Tab::Messages => "messages",
            Tab::Groups => "groups",
            Tab::Blacklist => "blacklist",
            Tab::Scheduler => "scheduler",
            Tab::Settings => "settings",
        }
    }

    pub fn title(&self) -> &'static str {
        match self {
            Tab::Dashboard => "Dashboard",
            Tab::Messages => "Messages",
            Tab::Groups => "Groups",
            Tab::Blacklist => "Blacklist",
            Tab::Scheduler => "Scheduler",
            Tab::Settings => "Settings",
        }
    }

    pub fn is_placeholder(&self) -> bool {
        *self != Tab::Dashboard
    }
}

impl fmt::Display for Tab {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tab {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        Tab::ALL
            .into_iter()
            .find(|t| t.as_str() == wanted)
            .ok_or_else(|| {
                let names = Tab::ALL.map(|t| t.as_str()).join(", ");
                format!("unknown tab {s:?} (expected one of: {names})")
            })
    }
}

#[derive(Clone, Debug, PartialEq)]
pub enum Screen {
    Loading,
    Login,
    CodeVerification { phone_number: String },
    TwoFactor { phone_number: String },
    Dashboard { tab: Tab, user: User },
}

impl Screen {
    pub fn name(&self) -> &'static str {
        match self {
            Screen::Loading => "loading",
            Screen::Login => "login",
            Screen::CodeVerification { .. } => "code_verification",
            Screen::TwoFactor { .. } => "two_factor",
            Screen::Dashboard { .. } => "dashboard",
        }
    }
}

/// Pick the screen for a session snapshot.
///
/// `tab` only matters once authenticated.
pub fn route(s: &SessionSnapshot, tab: Tab) -> Screen {
    if s.is_resuming {
        return Screen::Loading;
    }
    let phone = || s.pending_phone_number.clone().unwrap_or_default();
    match s.step {
        AuthStep::Login => Screen::Login,
        AuthStep::AwaitingCode => Screen::CodeVerification {
            phone_number: phone(),
        },
        AuthStep::Awaiting2fa => Screen::TwoFactor {
            phone_number: phone(),
        },
        AuthStep::Authenticated => match &s.user {
            Some(user) => Screen::Dashboard {
                tab,
                user: user.clone(),
            },
            None => Screen::Login,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snap(step: AuthStep) -> SessionSnapshot {
        SessionSnapshot {
            step,
            user: None,
            pending_phone_number: None,
            is_busy: false,
            is_resuming: false,
            last_error: None,
        }
    }

    #[test]
    fn each_step_has_one_screen() {
        assert_eq!(route(&snap(AuthStep::Login), Tab::Groups), Screen::Login);

        let mut s = snap(AuthStep::AwaitingCode);
        s.pending_phone_number = Some("+15551234567".to_string());
        assert_eq!(
            route(&s, Tab::Dashboard),
            Screen::CodeVerification {
                phone_number: "+15551234567".to_string()
            }
        );

        s.step = AuthStep::Awaiting2fa;
        assert_eq!(route(&s, Tab::Dashboard).name(), "two_factor");

        let mut s = snap(AuthStep::Authenticated);
        s.user = Some(User::default());
        assert_eq!(
            route(&s, Tab::Groups),
            Screen::Dashboard {
                tab: Tab::Groups,
                user: User::default()
            }
        );
    }

    #[test]
    fn resuming_shows_loading_regardless_of_step() {
        let mut s = snap(AuthStep::Login);
        s.is_resuming = true;
        assert_eq!(route(&s, Tab::Dashboard), Screen::Loading);
    }

    #[test]
    fn busy_and_errors_do_not_change_the_screen() {
        let mut s = snap(AuthStep::Login);
        s.is_busy = true;
        s.last_error = Some("Network error".to_string());
        assert_eq!(route(&s, Tab::Dashboard), Screen::Login);
    }

    #[test]
    fn tabs_parse_case_insensitively() {
        assert_eq!("Groups".parse::<Tab>(), Ok(Tab::Groups));
        assert_eq!(" scheduler ".parse::<Tab>(), Ok(Tab::Scheduler));
        assert!("inbox".parse::<Tab>().unwrap_err().contains("blacklist"));
        assert!(Tab::Settings.is_placeholder());
        assert!(!Tab::Dashboard.is_placeholder());
    }
}
