pub mod templates;

use crate::domain::change::Direction;
use crate::domain::subscriber::{Subscriber, Tier};
use serde::Serialize;
use std::sync::Arc;
use uuid::Uuid;

/// What a subscriber is told about. Carries no scoring internals beyond the move itself.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChangeNotice {
    pub company_id: i64,
    pub ticker: String,
    pub company_name: String,
    pub previous_score: f64,
    pub current_score: f64,
    pub delta: f64,
    pub direction: Direction,
    pub report_id: Option<Uuid>,
    pub summary: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NotificationContent {
    pub title: String,
    pub body: String,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub user_id: Uuid,
    pub company_id: i64,
    pub report_id: Option<Uuid>,
    pub tier: Tier,
    pub content: NotificationContent,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Recipient {
    pub subscriber: Subscriber,
    pub tier: Tier,
}

impl Recipient {
    /// Premium recipients first, then free, each group in directory order.
    pub fn partition_by_tier(subscribers: Vec<Subscriber>) -> Vec<Recipient> {
        let (premium, free): (Vec<_>, Vec<_>) = subscribers
            .into_iter()
            .map(|subscriber| Recipient {
                tier: subscriber.tier(),
                subscriber,
            })
            .partition(|r| r.tier == Tier::Premium);

        premium.into_iter().chain(free).collect()
    }
}

#[async_trait::async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, notification: &Notification) -> anyhow::Result<()>;
}

pub type TemplateFn = fn(Tier, &ChangeNotice) -> NotificationContent;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeliveryFailure {
    pub user_id: Uuid,
    pub tier: Tier,
    pub error: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DispatchOutcome {
    pub sent: usize,
    pub failures: Vec<DeliveryFailure>,
}

#[derive(Clone)]
pub struct NotificationDispatcher {
    sink: Arc<dyn NotificationSink>,
    render: TemplateFn,
}

impl NotificationDispatcher {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self::with_templates(sink, templates::render_for_tier)
    }

    pub fn with_templates(sink: Arc<dyn NotificationSink>, render: TemplateFn) -> Self {
        Self { sink, render }
    }

    /// Attempts every recipient. A failed delivery is recorded and the loop moves on.
    pub async fn dispatch(&self, recipients: &[Recipient], notice: &ChangeNotice) -> DispatchOutcome {
        let mut outcome = DispatchOutcome::default();

        for recipient in recipients {
            let notification = Notification {
                user_id: recipient.subscriber.user_id,
                company_id: notice.company_id,
                report_id: notice.report_id,
                tier: recipient.tier,
                content: (self.render)(recipient.tier, notice),
            };

            match self.sink.deliver(&notification).await {
                Ok(()) => outcome.sent += 1,
                Err(err) => {
                    tracing::warn!(
                        ticker = %notice.ticker,
                        user_id = %recipient.subscriber.user_id,
                        tier = recipient.tier.as_str(),
                        error = %err,
                        "notification delivery failed"
                    );
                    outcome.failures.push(DeliveryFailure {
                        user_id: recipient.subscriber.user_id,
                        tier: recipient.tier,
                        error: format!("{err:#}"),
                    });
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::monitor::testing::{subscriber, RecordingSink};

    fn notice() -> ChangeNotice {
        ChangeNotice {
            company_id: 1,
            ticker: "ACME".to_string(),
            company_name: "Acme Corp".to_string(),
            previous_score: 60.0,
            current_score: 66.0,
            delta: 6.0,
            direction: Direction::Positive,
            report_id: Some(Uuid::new_v4()),
            summary: Some("Margins expanded.".to_string()),
        }
    }

    #[test]
    fn partition_puts_premium_first() {
        let subs = vec![
            subscriber(false),
            subscriber(true),
            subscriber(false),
            subscriber(true),
        ];
        let recipients = Recipient::partition_by_tier(subs.clone());
        let tiers: Vec<Tier> = recipients.iter().map(|r| r.tier).collect();
        assert_eq!(tiers, vec![Tier::Premium, Tier::Premium, Tier::Free, Tier::Free]);
        assert_eq!(recipients[0].subscriber, subs[1]);
        assert_eq!(recipients[2].subscriber, subs[0]);
    }

    #[tokio::test]
    async fn failed_delivery_does_not_stop_the_rest() {
        let subs: Vec<_> = (0..3)
            .map(|_| subscriber(true))
            .chain((0..2).map(|_| subscriber(false)))
            .collect();
        let sink = Arc::new(RecordingSink::default());
        sink.fail_for(subs[0].user_id);

        let dispatcher = NotificationDispatcher::new(sink.clone());
        let outcome = dispatcher
            .dispatch(&Recipient::partition_by_tier(subs.clone()), &notice())
            .await;

        assert_eq!(sink.attempts(), 5);
        assert_eq!(outcome.sent, 4);
        assert_eq!(outcome.failures.len(), 1);
        assert_eq!(outcome.failures[0].user_id, subs[0].user_id);
        assert_eq!(outcome.failures[0].tier, Tier::Premium);
    }

    #[tokio::test]
    async fn tier_selects_template() {
        fn marker(tier: Tier, _notice: &ChangeNotice) -> NotificationContent {
            NotificationContent {
                title: tier.as_str().to_string(),
                body: String::new(),
                link: None,
            }
        }

        let sink = Arc::new(RecordingSink::default());
        let dispatcher = NotificationDispatcher::with_templates(sink.clone(), marker);
        dispatcher
            .dispatch(
                &Recipient::partition_by_tier(vec![subscriber(false), subscriber(true)]),
                &notice(),
            )
            .await;

        let titles: Vec<String> = sink
            .delivered()
            .into_iter()
            .map(|n| n.content.title)
            .collect();
        assert_eq!(titles, vec!["premium".to_string(), "free".to_string()]);
    }

    #[tokio::test]
    async fn empty_recipient_list_sends_nothing() {
        let sink = Arc::new(RecordingSink::default());
        let outcome = NotificationDispatcher::new(sink.clone())
            .dispatch(&[], &notice())
            .await;
        assert_eq!(outcome, DispatchOutcome::default());
        assert_eq!(sink.attempts(), 0);
    }
}
