// OpenAPI specification for the Console API

use autoads_core::console::{ConfigEntry, ConsoleStats, Role, Subscription, TokenBalance, TokenStats, UserRecord};
use autoads_core::notification::{DailyIncidents, Notification, NotificationMessage, Severity};
use autoads_core::EventRecord;
use autoads_server::ErrorBody;
use utoipa::OpenApi;

use crate::api;
use crate::services::health::{ServiceHealth, ServiceStatus, Verdict};
use crate::services::slo::{HistogramNote, ServiceSlo};
use crate::services::{HealthReport, LimitsPolicy, SloReport};

#[derive(OpenApi)]
#[openapi(
    paths(
        api::users::list_users,
        api::users::get_user,
        api::users::get_tokens,
        api::users::grant_tokens,
        api::users::get_subscription,
        api::users::put_subscription,
        api::users::put_role,
        api::stats::token_stats,
        api::stats::stats,
        api::slo::slo,
        api::limits::get_policy,
        api::limits::put_policy,
        api::events::list_events,
        api::events::export_events,
        api::events::get_event,
        api::bulk_actions::snapshots,
        api::bulk_actions::dead_letters,
        api::bulk_actions::retry_batch,
        api::bulk_actions::retry_one,
        api::alerts::alerts,
        api::alerts::incidents,
        api::config::get_config,
        api::config::put_config,
        api::health::health,
    ),
    components(schemas(
        ErrorBody,
        Role,
        UserRecord,
        TokenBalance,
        Subscription,
        TokenStats,
        ConsoleStats,
        ConfigEntry,
        EventRecord,
        Severity,
        NotificationMessage,
        Notification,
        DailyIncidents,
        SloReport,
        ServiceSlo,
        HistogramNote,
        HealthReport,
        ServiceHealth,
        ServiceStatus,
        Verdict,
        LimitsPolicy,
        api::users::UserList,
        api::users::GrantRequest,
        api::users::SubscriptionRequest,
        api::users::RoleRequest,
        api::events::EventList,
        api::alerts::AlertList,
        api::alerts::IncidentList,
    )),
    tags(
        (name = "users", description = "Users, roles, token grants and subscriptions"),
        (name = "stats", description = "Aggregate counters"),
        (name = "observability", description = "SLO scrape and health fan-out"),
        (name = "limits", description = "Adscenter limits policy"),
        (name = "events", description = "Event store query and CSV export"),
        (name = "adscenter", description = "Bulk-action proxies acting as the operation owner"),
        (name = "alerts", description = "Warn and error notifications"),
        (name = "config", description = "Key-value console configuration")
    ),
    info(
        title = "AutoAds Console API",
        description = "Admin-only aggregation over the AutoAds services"
    )
)]
pub struct ApiDoc;
