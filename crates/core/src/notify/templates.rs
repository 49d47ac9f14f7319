use crate::domain::change::Direction;
use crate::domain::subscriber::Tier;
use crate::notify::{ChangeNotice, NotificationContent};

pub fn render_for_tier(tier: Tier, notice: &ChangeNotice) -> NotificationContent {
    match tier {
        Tier::Premium => premium(notice),
        Tier::Free => free(notice),
    }
}

fn verb(direction: Direction) -> &'static str {
    match direction {
        Direction::Positive => "improved",
        Direction::Negative => "deteriorated",
    }
}

fn premium(notice: &ChangeNotice) -> NotificationContent {
    let mut body = format!(
        "{} ({}) score {} from {:.1} to {:.1} ({:+.1} points).",
        notice.company_name,
        notice.ticker,
        verb(notice.direction),
        notice.previous_score,
        notice.current_score,
        notice.delta
    );
    if let Some(summary) = notice.summary.as_deref().filter(|s| !s.is_empty()) {
        body.push_str("\n\n");
        body.push_str(summary);
    }

    NotificationContent {
        title: format!("{}: fundamentals {}", notice.ticker, verb(notice.direction)),
        body,
        link: notice.report_id.map(|id| format!("/reports/{id}")),
    }
}

fn free(notice: &ChangeNotice) -> NotificationContent {
    NotificationContent {
        title: format!("{}: fundamentals {}", notice.ticker, verb(notice.direction)),
        body: format!(
            "The fundamental score of {} ({}) has {}. Upgrade to premium to read the full analysis.",
            notice.company_name,
            notice.ticker,
            verb(notice.direction)
        ),
        link: Some(format!("/companies/{}", notice.ticker)),
    }
}
