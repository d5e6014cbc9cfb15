//! Tenant descriptors and active tenant selection

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::session::Session;
use crate::error::AppError;

/// Provider-side organisation id that scopes every API call
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TenantId(pub String);

impl TenantId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TenantId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Tenant descriptor as returned by the connections endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    /// Connection id
    pub id: String,
    pub tenant_id: TenantId,
    #[serde(default)]
    pub tenant_type: Option<String>,
    #[serde(default)]
    pub tenant_name: Option<String>,
    #[serde(default, deserialize_with = "provider_timestamp")]
    pub created_date_utc: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "provider_timestamp")]
    pub updated_date_utc: Option<DateTime<Utc>>,
}

/// Accepts RFC 3339 as well as the offset-less UTC form the connections
/// endpoint returns (`2019-07-09T23:40:30.1833130`).
fn provider_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };

    if let Ok(parsed) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(parsed.with_timezone(&Utc)));
    }

    NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .map(|naive| Some(naive.and_utc()))
        .map_err(serde::de::Error::custom)
}

/// Order tenants most recently authorized first
///
/// Ties and missing timestamps keep the provider's order.
pub fn order_by_recent_connection(tenants: &mut [Tenant]) {
    tenants.sort_by(|a, b| b.updated_date_utc.cmp(&a.updated_date_utc));
}

/// Tenant id the current session's API calls are scoped to
///
/// # Errors
/// `NotAuthenticated` when there is no session or no completed callback
pub fn active_tenant_id(session: Option<&Session>) -> Result<TenantId, AppError> {
    session
        .and_then(|session| session.authorization.as_ref())
        .map(|auth| auth.active_tenant.tenant_id.clone())
        .ok_or(AppError::NotAuthenticated)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn tenant(id: &str, updated: Option<i64>) -> Tenant {
        Tenant {
            id: format!("conn-{id}"),
            tenant_id: TenantId(id.to_string()),
            tenant_type: Some("ORGANISATION".to_string()),
            tenant_name: Some(format!("Org {id}")),
            created_date_utc: None,
            updated_date_utc: updated.map(|secs| Utc.timestamp_opt(secs, 0).unwrap()),
        }
    }

    #[test]
    fn orders_most_recent_first() {
        let mut tenants = vec![
            tenant("a", Some(100)),
            tenant("b", Some(300)),
            tenant("c", Some(200)),
        ];
        order_by_recent_connection(&mut tenants);

        let ids: Vec<&str> = tenants.iter().map(|t| t.tenant_id.as_str()).collect();
        assert_eq!(ids, ["b", "c", "a"]);
    }

    #[test]
    fn keeps_provider_order_without_timestamps() {
        let mut tenants = vec![tenant("a", None), tenant("b", None)];
        order_by_recent_connection(&mut tenants);
        assert_eq!(tenants[0].tenant_id.as_str(), "a");
    }

    #[test]
    fn parses_connections_payload() {
        let payload = serde_json::json!([{
            "id": "e1eede29-f875-4a5d-8470-17f6a29a88b1",
            "authEventId": "d99ecdfe-391d-43d2-b834-17636ba90e8d",
            "tenantId": "70784a63-d24b-46a9-a4db-0e70a274b056",
            "tenantType": "ORGANISATION",
            "tenantName": "Maple Florists Ltd",
            "createdDateUtc": "2019-07-09T23:40:30.1833130",
            "updatedDateUtc": "2020-05-15T01:35:13.8491980"
        }]);
        let parsed: Vec<Tenant> = serde_json::from_value(payload).unwrap();

        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].tenant_name.as_deref(), Some("Maple Florists Ltd"));
        assert_eq!(
            parsed[0].updated_date_utc,
            Some(Utc.with_ymd_and_hms(2020, 5, 15, 1, 35, 13).unwrap()
                + chrono::Duration::nanoseconds(849_198_000))
        );
    }

    #[test]
    fn accepts_rfc3339_timestamps() {
        let payload = serde_json::json!({
            "id": "conn",
            "tenantId": "t",
            "updatedDateUtc": "2020-05-15T01:35:13Z"
        });
        let parsed: Tenant = serde_json::from_value(payload).unwrap();
        assert_eq!(
            parsed.updated_date_utc,
            Some(Utc.with_ymd_and_hms(2020, 5, 15, 1, 35, 13).unwrap())
        );
        assert!(parsed.tenant_name.is_none());
    }

    #[test]
    fn no_session_is_not_authenticated() {
        assert!(matches!(
            active_tenant_id(None),
            Err(AppError::NotAuthenticated)
        ));
    }
}
