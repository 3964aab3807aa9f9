// CSV export of event store rows

use autoads_core::EventRecord;

pub const CSV_HEADER: [&str; 8] = [
    "id",
    "eventName",
    "aggregateType",
    "aggregateId",
    "userId",
    "idempotencyKey",
    "createdAt",
    "payload",
];

/// Quote a field when it holds a comma, quote or line break
pub fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn push_row<'a>(out: &mut String, fields: impl IntoIterator<Item = &'a str>) {
    let row: Vec<String> = fields.into_iter().map(escape_field).collect();
    out.push_str(&row.join(","));
    out.push('\n');
}

pub fn events_csv(records: &[EventRecord]) -> String {
    let mut out = String::new();
    push_row(&mut out, CSV_HEADER);
    for record in records {
        let created_at = record.created_at.to_rfc3339();
        let payload = record.payload.to_string();
        push_row(
            &mut out,
            [
                record.id.as_str(),
                record.event_name.as_str(),
                record.aggregate_type.as_str(),
                record.aggregate_id.as_str(),
                record.user_id.as_deref().unwrap_or_default(),
                record.idempotency_key.as_deref().unwrap_or_default(),
                created_at.as_str(),
                payload.as_str(),
            ],
        );
    }
    out
}
