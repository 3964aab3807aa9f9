// Event to notification mapping
//
// Whitelisted types only. Events without a user, or whose payload does not
// match the typed schema, produce nothing.

use autoads_core::events::{
    EventData, BATCH_OPS_TASK_COMPLETED, BATCH_OPS_TASK_FAILED, SITERANK_COMPLETED, TOKEN_DEBITED,
    WORKFLOW_COMPLETED,
};
use autoads_core::notification::{NewNotification, NotificationMessage, Severity};
use autoads_core::Envelope;
use serde_json::{json, Map, Value};

pub const NOTIFYING_EVENTS: &[&str] = &[
    SITERANK_COMPLETED,
    BATCH_OPS_TASK_COMPLETED,
    BATCH_OPS_TASK_FAILED,
    TOKEN_DEBITED,
    WORKFLOW_COMPLETED,
];

pub fn is_notifying(event_type: &str) -> bool {
    NOTIFYING_EVENTS.contains(&event_type)
}

fn extra(envelope: &Envelope, fields: &[(&str, Value)]) -> Map<String, Value> {
    let mut map = Map::new();
    map.insert("eventId".into(), json!(envelope.id));
    for (key, value) in fields {
        if !value.is_null() {
            map.insert((*key).to_string(), value.clone());
        }
    }
    map
}

fn notification(
    user_id: String,
    envelope: &Envelope,
    title: &str,
    severity: Severity,
    category: &str,
    summary: String,
    fields: &[(&str, Value)],
) -> NewNotification {
    NewNotification {
        user_id,
        notification_type: envelope.event_type.clone(),
        title: title.to_string(),
        message: NotificationMessage {
            severity,
            category: category.to_string(),
            summary,
            extra: extra(envelope, fields),
        },
    }
}

/// Notification for an event, if it should produce one
pub fn compose(envelope: &Envelope) -> Option<NewNotification> {
    if !is_notifying(&envelope.event_type) {
        return None;
    }
    let composed = match envelope.event() {
        EventData::SiterankCompleted(d) => {
            let failed = d.status == "failed";
            let target = d.host.clone().unwrap_or_else(|| d.offer_id.clone());
            let (title, severity, summary) = if failed {
                (
                    "Site analysis failed",
                    Severity::Warn,
                    format!(
                        "Traffic analysis for {} failed: {}",
                        target,
                        d.error.as_deref().unwrap_or("unknown error")
                    ),
                )
            } else {
                (
                    "Site analysis ready",
                    Severity::Info,
                    format!("Traffic analysis for {} is ready", target),
                )
            };
            notification(
                d.user_id.clone(),
                envelope,
                title,
                severity,
                "siterank",
                summary,
                &[
                    ("analysisId", json!(d.analysis_id)),
                    ("offerId", json!(d.offer_id)),
                    ("cacheHit", json!(d.cache_hit)),
                ],
            )
        }
        EventData::BatchOpsTaskCompleted(d) => notification(
            d.user_id.clone(),
            envelope,
            "Bulk operation completed",
            Severity::Info,
            "bulk",
            format!("Bulk operation {} completed", d.operation_id),
            &[
                ("operationId", json!(d.operation_id)),
                ("result", d.summary.clone().unwrap_or(Value::Null)),
            ],
        ),
        EventData::BatchOpsTaskFailed(d) => notification(
            d.user_id.clone(),
            envelope,
            "Bulk operation failed",
            Severity::Error,
            "bulk",
            format!(
                "Bulk operation {} failed: {}",
                d.operation_id,
                d.error.as_deref().unwrap_or("unknown error")
            ),
            &[("operationId", json!(d.operation_id))],
        ),
        EventData::TokenDebited(d) => notification(
            d.user_id.clone(),
            envelope,
            "Tokens debited",
            Severity::Info,
            "billing",
            match &d.reason {
                Some(reason) => format!("{} tokens debited for {}", d.amount, reason),
                None => format!("{} tokens debited", d.amount),
            },
            &[
                ("amount", json!(d.amount)),
                ("reservationId", json!(d.reservation_id)),
            ],
        ),
        EventData::WorkflowCompleted(d) => notification(
            d.user_id.clone().unwrap_or_default(),
            envelope,
            "Workflow completed",
            Severity::Info,
            "workflow",
            format!("Workflow {} completed", d.workflow_id),
            &[("workflowId", json!(d.workflow_id))],
        ),
        _ => {
            tracing::debug!(event_type = %envelope.event_type, "Payload does not match its event schema");
            return None;
        }
    };
    (!composed.user_id.is_empty()).then_some(composed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use autoads_core::events::{SiterankCompletedData, SiterankRequestedData, TokenData};

    fn completed(status: &str, error: Option<&str>) -> Envelope {
        Envelope::new(
            "siterank",
            SiterankCompletedData {
                analysis_id: "a1".into(),
                offer_id: "o1".into(),
                user_id: "u1".into(),
                status: status.into(),
                cache_hit: false,
                host: Some("foo.com".into()),
                error: error.map(str::to_string),
                extra: Map::new(),
            },
        )
    }

    #[test]
    fn test_siterank_outcomes() {
        let ok = compose(&completed("completed", None)).unwrap();
        assert_eq!(ok.user_id, "u1");
        assert_eq!(ok.notification_type, "SiterankCompleted");
        assert_eq!(ok.message.severity, Severity::Info);
        assert_eq!(ok.message.category, "siterank");
        assert_eq!(ok.message.extra["analysisId"], "a1");

        let failed = compose(&completed("failed", Some("HTTP 503"))).unwrap();
        assert_eq!(failed.message.severity, Severity::Warn);
        assert!(failed.message.summary.contains("HTTP 503"));
    }

    #[test]
    fn test_token_debit_summary() {
        let envelope = Envelope::new(
            "billing",
            EventData::TokenDebited(TokenData {
                user_id: "u2".into(),
                amount: 3,
                reservation_id: None,
                reason: Some("siterank".into()),
                extra: Map::new(),
            }),
        );
        let n = compose(&envelope).unwrap();
        assert_eq!(n.message.summary, "3 tokens debited for siterank");
        assert!(!n.message.extra.contains_key("reservationId"));
    }

    #[test]
    fn test_other_events_are_ignored() {
        let requested = Envelope::new(
            "siterank",
            SiterankRequestedData {
                analysis_id: "a1".into(),
                offer_id: "o1".into(),
                user_id: "u1".into(),
                extra: Map::new(),
            },
        );
        assert!(compose(&requested).is_none());
    }
}
