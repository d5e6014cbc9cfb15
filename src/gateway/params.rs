//! Caller parameter validation for gateway operations

use std::collections::HashMap;

use chrono::NaiveDate;
use uuid::Uuid;

use super::registry::{Operation, ParamKind, ParamLocation, UpstreamCall};
use crate::error::AppError;

const MAX_TEXT_LEN: usize = 512;

/// Validated parameters for one operation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OperationArgs {
    path: Vec<(&'static str, String)>,
    query: Vec<(&'static str, String)>,
}

impl OperationArgs {
    /// Validate raw query parameters against the operation's schema
    ///
    /// # Errors
    /// `Validation` for unknown names, missing required values, or
    /// values that do not match the declared kind
    pub fn from_query(
        operation: &Operation,
        raw: &HashMap<String, String>,
    ) -> Result<Self, AppError> {
        let mut unknown: Vec<&str> = raw
            .keys()
            .filter(|name| operation.param(name).is_none())
            .map(String::as_str)
            .collect();
        if !unknown.is_empty() {
            unknown.sort_unstable();
            return Err(AppError::Validation(format!(
                "unknown parameter(s) for {}: {}",
                operation.name,
                unknown.join(", ")
            )));
        }

        let mut args = Self::default();
        for spec in operation.params {
            let Some(value) = raw.get(spec.name) else {
                if spec.required {
                    return Err(AppError::Validation(format!(
                        "{} requires parameter {}",
                        operation.name, spec.name
                    )));
                }
                continue;
            };

            let value = validate(spec.kind, value).map_err(|reason| {
                AppError::Validation(format!("parameter {} {reason}", spec.name))
            })?;

            match spec.location {
                ParamLocation::Path => args.path.push((spec.name, value)),
                ParamLocation::Query => args.query.push((spec.name, value)),
            }
        }

        Ok(args)
    }

    pub fn query(&self) -> &[(&'static str, String)] {
        &self.query
    }

    /// Fill the `{Name}` placeholders of an upstream path
    pub fn render_path(&self, call: &UpstreamCall) -> String {
        self.path
            .iter()
            .fold(call.path.to_string(), |path, (name, value)| {
                path.replace(&format!("{{{name}}}"), value)
            })
    }
}

/// Check `value` against `kind`, returning the value to send upstream
///
/// GUIDs are forwarded in canonical hyphenated form.
fn validate(kind: ParamKind, value: &str) -> Result<String, String> {
    match kind {
        ParamKind::Date => NaiveDate::parse_from_str(value, "%Y-%m-%d")
            .map(|_| value.to_string())
            .map_err(|_| "must be a date in YYYY-MM-DD format".to_string()),
        ParamKind::Guid => Uuid::parse_str(value)
            .map(|guid| guid.hyphenated().to_string())
            .map_err(|_| "must be a GUID".to_string()),
        ParamKind::PositiveInteger => match value.parse::<u32>() {
            Ok(n) if n > 0 => Ok(value.to_string()),
            _ => Err("must be a positive integer".to_string()),
        },
        ParamKind::Text => {
            if value.trim().is_empty() {
                Err("must not be empty".to_string())
            } else if value.len() > MAX_TEXT_LEN {
                Err(format!("must be at most {MAX_TEXT_LEN} bytes"))
            } else {
                Ok(value.to_string())
            }
        }
        ParamKind::OneOf(allowed) => {
            if allowed.contains(&value) {
                Ok(value.to_string())
            } else {
                Err(format!("must be one of {}", allowed.join(", ")))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::registry::find;

    fn raw(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn accepts_report_dates() {
        let op = find("report_profit_and_loss").unwrap();
        let args = OperationArgs::from_query(
            op,
            &raw(&[("fromDate", "2022-12-01"), ("timeframe", "MONTH")]),
        )
        .unwrap();

        assert_eq!(
            args.query(),
            &[
                ("fromDate", "2022-12-01".to_string()),
                ("timeframe", "MONTH".to_string())
            ]
        );
    }

    #[test]
    fn rejects_bad_date() {
        let op = find("report_balance_sheet").unwrap();
        let err = OperationArgs::from_query(op, &raw(&[("date", "01/12/2022")])).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("date")));
    }

    #[test]
    fn rejects_unknown_parameter() {
        let op = find("accounts").unwrap();
        let err = OperationArgs::from_query(op, &raw(&[("tenant", "x")])).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("tenant")));
    }

    #[test]
    fn requires_path_parameter() {
        let op = find("purchase_order").unwrap();
        let err = OperationArgs::from_query(op, &raw(&[])).unwrap_err();
        assert!(matches!(err, AppError::Validation(msg) if msg.contains("PurchaseOrderID")));
    }

    #[test]
    fn renders_path_parameter() {
        let op = find("purchase_order_history").unwrap();
        let args = OperationArgs::from_query(
            op,
            &raw(&[("PurchaseOrderID", "8086ffca-9fb1-4415-8cec-253f223f92f1")]),
        )
        .unwrap();

        assert_eq!(
            args.render_path(&op.calls[0]),
            "PurchaseOrders/8086ffca-9fb1-4415-8cec-253f223f92f1/History"
        );
        assert!(args.query().is_empty());
    }

    #[test]
    fn guid_rejects_path_traversal() {
        assert!(validate(ParamKind::Guid, "8086ffca-9fb1-4415-8cec-253f223f92f1").is_ok());
        assert!(validate(ParamKind::Guid, "../../connections").is_err());
        assert!(validate(ParamKind::Guid, "8086ffca-9fb1-4415-8cec-253f223f92f").is_err());
        assert!(validate(ParamKind::Guid, "8086ffca-9fb1-4415-8cec-253f223f92fz").is_err());
    }

    #[test]
    fn guid_is_forwarded_hyphenated_lowercase() {
        let op = find("user").unwrap();
        let args = OperationArgs::from_query(
            op,
            &raw(&[("UserID", "8086FFCA9FB144158CEC253F223F92F1")]),
        )
        .unwrap();

        assert_eq!(
            args.render_path(&op.calls[0]),
            "Users/8086ffca-9fb1-4415-8cec-253f223f92f1"
        );
    }

    #[test]
    fn enumerations_and_integers() {
        assert!(validate(ParamKind::OneOf(&["A", "B"]), "B").is_ok());
        assert!(validate(ParamKind::OneOf(&["A", "B"]), "b").is_err());
        assert!(validate(ParamKind::PositiveInteger, "3").is_ok());
        assert!(validate(ParamKind::PositiveInteger, "0").is_err());
        assert!(validate(ParamKind::PositiveInteger, "-1").is_err());
        assert!(validate(ParamKind::Text, "  ").is_err());
    }
}
