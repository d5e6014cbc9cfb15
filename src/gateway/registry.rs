//! Gateway operation registry
//!
//! Each entry maps a legacy route to one or more upstream endpoints and
//! declares which caller parameters it accepts.

use serde::Serialize;

/// Upstream API family
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Api {
    Accounting,
    Finance,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamLocation {
    /// Substituted into `{Name}` in the endpoint path
    Path,
    Query,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ParamKind {
    /// `YYYY-MM-DD`
    Date,
    /// 8-4-4-4-12 hex identifier
    Guid,
    PositiveInteger,
    Text,
    OneOf(&'static [&'static str]),
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ParamSpec {
    pub name: &'static str,
    pub location: ParamLocation,
    pub kind: ParamKind,
    pub required: bool,
}

impl ParamSpec {
    const fn query(name: &'static str, kind: ParamKind) -> Self {
        Self {
            name,
            location: ParamLocation::Query,
            kind,
            required: false,
        }
    }

    const fn path(name: &'static str) -> Self {
        Self {
            name,
            location: ParamLocation::Path,
            kind: ParamKind::Guid,
            required: true,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct UpstreamCall {
    pub api: Api,
    /// Relative to the API base, may contain `{Name}` placeholders
    pub path: &'static str,
}

const fn accounting(path: &'static str) -> UpstreamCall {
    UpstreamCall {
        api: Api::Accounting,
        path,
    }
}

/// A named passthrough from one route to the upstream API
#[derive(Debug, Serialize)]
pub struct Operation {
    pub name: &'static str,
    pub route: &'static str,
    /// Called in order; the response of the last call is returned
    pub calls: &'static [UpstreamCall],
    pub params: &'static [ParamSpec],
}

impl Operation {
    pub fn param(&self, name: &str) -> Option<&'static ParamSpec> {
        self.params.iter().find(|spec| spec.name == name)
    }
}

const TIMEFRAMES: &[&str] = &["MONTH", "QUARTER", "YEAR"];
const PURCHASE_ORDER_STATUSES: &[&str] =
    &["DRAFT", "SUBMITTED", "AUTHORISED", "BILLED", "DELETED"];

const WHERE: ParamSpec = ParamSpec::query("where", ParamKind::Text);
const ORDER: ParamSpec = ParamSpec::query("order", ParamKind::Text);
const PAGE: ParamSpec = ParamSpec::query("page", ParamKind::PositiveInteger);
const PERIODS: ParamSpec = ParamSpec::query("periods", ParamKind::PositiveInteger);
const TIMEFRAME: ParamSpec = ParamSpec::query("timeframe", ParamKind::OneOf(TIMEFRAMES));

/// All registered gateway operations
pub static OPERATIONS: &[Operation] = &[
    Operation {
        name: "bank_transactions",
        route: "/getBankTransactions",
        calls: &[accounting("BankTransactions")],
        params: &[WHERE, ORDER, PAGE],
    },
    Operation {
        name: "bank_transfers",
        route: "/getBankTransfers",
        calls: &[accounting("BankTransfers")],
        params: &[WHERE, ORDER],
    },
    Operation {
        name: "currencies",
        route: "/getCurrencies",
        calls: &[accounting("Currencies")],
        params: &[WHERE, ORDER],
    },
    Operation {
        name: "organisations",
        route: "/getOrganisations",
        calls: &[accounting("Organisation")],
        params: &[],
    },
    Operation {
        name: "overpayments",
        route: "/getOverpayments",
        calls: &[accounting("Overpayments")],
        params: &[WHERE, ORDER, PAGE],
    },
    Operation {
        name: "report_profit_and_loss",
        route: "/getReportProfitAndLoss",
        calls: &[accounting("Reports/ProfitAndLoss")],
        params: &[
            ParamSpec::query("fromDate", ParamKind::Date),
            ParamSpec::query("toDate", ParamKind::Date),
            PERIODS,
            TIMEFRAME,
        ],
    },
    Operation {
        name: "report_balance_sheet",
        route: "/getReportBalanceSheet",
        calls: &[accounting("Reports/BalanceSheet")],
        params: &[ParamSpec::query("date", ParamKind::Date), PERIODS, TIMEFRAME],
    },
    Operation {
        name: "financial_statement_cashflow",
        route: "/getFinancialStatementCashflow",
        calls: &[UpstreamCall {
            api: Api::Finance,
            path: "FinancialStatements/cashflow",
        }],
        params: &[
            ParamSpec::query("startDate", ParamKind::Date),
            ParamSpec::query("endDate", ParamKind::Date),
        ],
    },
    Operation {
        name: "report_executive_summary",
        route: "/getReportExecutiveSummary",
        calls: &[accounting("Reports/ExecutiveSummary")],
        params: &[ParamSpec::query("date", ParamKind::Date)],
    },
    Operation {
        name: "purchase_order_history",
        route: "/getPurchaseOrderHistory",
        calls: &[accounting("PurchaseOrders/{PurchaseOrderID}/History")],
        params: &[ParamSpec::path("PurchaseOrderID")],
    },
    Operation {
        name: "purchase_order",
        route: "/getPurchaseOrder",
        calls: &[accounting("PurchaseOrders/{PurchaseOrderID}")],
        params: &[ParamSpec::path("PurchaseOrderID")],
    },
    Operation {
        name: "prepayments",
        route: "/getPrepayments",
        calls: &[accounting("Prepayments")],
        params: &[WHERE, ORDER, PAGE],
    },
    Operation {
        name: "repeating_invoices",
        route: "/getRepeatingInvoices",
        calls: &[accounting("RepeatingInvoices")],
        params: &[WHERE, ORDER],
    },
    Operation {
        name: "reports_list",
        route: "/getReportsList",
        calls: &[accounting("Reports")],
        params: &[],
    },
    Operation {
        name: "tracking_categories",
        route: "/getTrackingCategories",
        calls: &[accounting("TrackingCategories")],
        params: &[WHERE, ORDER],
    },
    Operation {
        name: "user",
        route: "/getUser",
        calls: &[accounting("Users/{UserID}")],
        params: &[ParamSpec::path("UserID")],
    },
    Operation {
        name: "users",
        route: "/getUsers",
        calls: &[accounting("Users")],
        params: &[WHERE, ORDER],
    },
    Operation {
        name: "tax_rates",
        route: "/getTaxRates",
        calls: &[accounting("TaxRates")],
        params: &[WHERE, ORDER],
    },
    Operation {
        name: "purchase_orders",
        route: "/getPurchaseOrders",
        calls: &[accounting("PurchaseOrders")],
        params: &[
            ParamSpec::query("status", ParamKind::OneOf(PURCHASE_ORDER_STATUSES)),
            ParamSpec::query("DateFrom", ParamKind::Date),
            ParamSpec::query("DateTo", ParamKind::Date),
            ORDER,
            PAGE,
        ],
    },
    Operation {
        name: "budgets",
        route: "/getBudgets",
        calls: &[accounting("Budgets")],
        params: &[
            ParamSpec::query("DateFrom", ParamKind::Date),
            ParamSpec::query("DateTo", ParamKind::Date),
        ],
    },
    Operation {
        name: "batch_payments",
        route: "/getBatchPayments",
        calls: &[accounting("BatchPayments")],
        params: &[WHERE, ORDER],
    },
    Operation {
        name: "account",
        route: "/getAccount",
        calls: &[accounting("Accounts/{AccountID}")],
        params: &[ParamSpec::path("AccountID")],
    },
    Operation {
        name: "accounts",
        route: "/getAccounts",
        calls: &[accounting("Accounts")],
        params: &[WHERE, ORDER],
    },
    Operation {
        name: "invoice",
        route: "/invoice",
        calls: &[accounting("Contacts"), accounting("BankTransactions")],
        params: &[],
    },
];

/// Look up an operation by name
pub fn find(name: &str) -> Option<&'static Operation> {
    OPERATIONS.iter().find(|operation| operation.name == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn names_and_routes_are_unique() {
        let names: HashSet<_> = OPERATIONS.iter().map(|op| op.name).collect();
        let routes: HashSet<_> = OPERATIONS.iter().map(|op| op.route).collect();
        assert_eq!(names.len(), OPERATIONS.len());
        assert_eq!(routes.len(), OPERATIONS.len());
    }

    #[test]
    fn every_operation_calls_upstream() {
        for op in OPERATIONS {
            assert!(!op.calls.is_empty(), "{} has no upstream call", op.name);
            assert!(op.route.starts_with('/'), "{} route is relative", op.name);
        }
    }

    #[test]
    fn path_placeholders_have_matching_params() {
        for op in OPERATIONS {
            for call in op.calls {
                let mut rest = call.path;
                while let Some(start) = rest.find('{') {
                    let end = rest[start..].find('}').expect("unterminated placeholder") + start;
                    let name = &rest[start + 1..end];
                    let spec = op
                        .param(name)
                        .unwrap_or_else(|| panic!("{} lacks param {name}", op.name));
                    assert_eq!(spec.location, ParamLocation::Path);
                    assert!(spec.required);
                    rest = &rest[end + 1..];
                }
            }
        }
    }

    #[test]
    fn legacy_routes_are_registered() {
        for route in [
            "/getBankTransactions",
            "/getReportProfitAndLoss",
            "/getFinancialStatementCashflow",
            "/getPurchaseOrderHistory",
            "/getAccounts",
            "/invoice",
        ] {
            assert!(
                OPERATIONS.iter().any(|op| op.route == route),
                "{route} missing"
            );
        }
    }

    #[test]
    fn find_by_name() {
        assert_eq!(find("accounts").map(|op| op.route), Some("/getAccounts"));
        assert!(find("nope").is_none());
    }
}
