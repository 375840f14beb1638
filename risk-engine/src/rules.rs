//! Operator-defined deterministic rules
//!
//! Rules are matched against the raw request. A rule fires when all of its
//! conditions match; its action can only raise the decision. Field paths come
//! from a closed set, so a rule naming an unknown field is rejected as
//! malformed rather than silently never matching.

use crate::types::AssessmentRequest;
use crate::{Error, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::path::Path;
use std::str::FromStr;
use tracing::{debug, warn};

/// What a triggered rule asks for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    Block,
    Review,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = ">")]
    GreaterThan,
    #[serde(rename = "<")]
    LessThan,
    #[serde(rename = "=")]
    Equal,
    #[serde(rename = "!=")]
    NotEqual,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "not_contains")]
    NotContains,
    #[serde(rename = "in")]
    In,
    #[serde(rename = "not_in")]
    NotIn,
}

impl Operator {
    fn as_str(&self) -> &'static str {
        match self {
            Operator::GreaterThan => ">",
            Operator::LessThan => "<",
            Operator::Equal => "=",
            Operator::NotEqual => "!=",
            Operator::Contains => "contains",
            Operator::NotContains => "not_contains",
            Operator::In => "in",
            Operator::NotIn => "not_in",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dotted path into the request, e.g. `transaction.amount`
    #[serde(alias = "field_path")]
    pub field: String,
    pub operator: Operator,
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Rule {
    pub name: String,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub conditions: Vec<Condition>,
    pub action: Action,
}

fn default_enabled() -> bool {
    true
}

/// Request fields a rule may reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldPath {
    TransactionAmount,
    TransactionCurrency,
    TransactionMerchant,
    TransactionCategory,
    TransactionPaymentMethod,
    BeneficiaryCountry,
    UserId,
    PhoneNumber,
    AccountId,
    DeviceId,
    IpAddress,
    UserAgent,
    Country,
    EventType,
    Latitude,
    Longitude,
    Hour,
}

impl FromStr for FieldPath {
    type Err = Error;

    fn from_str(path: &str) -> Result<Self> {
        let field = match path.trim() {
            "transaction.amount" => FieldPath::TransactionAmount,
            "transaction.currency" => FieldPath::TransactionCurrency,
            "transaction.merchant" => FieldPath::TransactionMerchant,
            "transaction.category" => FieldPath::TransactionCategory,
            "transaction.payment_method" => FieldPath::TransactionPaymentMethod,
            "transaction.beneficiary.country" => FieldPath::BeneficiaryCountry,
            "identity.user_id" => FieldPath::UserId,
            "identity.phone_number" => FieldPath::PhoneNumber,
            "identity.account_id" => FieldPath::AccountId,
            "device.device_id" => FieldPath::DeviceId,
            "device.ip_address" => FieldPath::IpAddress,
            "device.user_agent" => FieldPath::UserAgent,
            "context.country" => FieldPath::Country,
            "context.event_type" => FieldPath::EventType,
            "context.geolocation.lat" => FieldPath::Latitude,
            "context.geolocation.lng" => FieldPath::Longitude,
            "context.hour" => FieldPath::Hour,
            other => return Err(Error::InvalidRule(format!("unknown field path '{}'", other))),
        };
        Ok(field)
    }
}

/// Resolved field value
#[derive(Debug, Clone, PartialEq)]
enum FieldValue {
    Number(Decimal),
    Text(String),
}

impl FieldPath {
    fn is_numeric(&self) -> bool {
        matches!(
            self,
            FieldPath::TransactionAmount
                | FieldPath::Latitude
                | FieldPath::Longitude
                | FieldPath::Hour
        )
    }

    /// `None` when the request does not carry the field
    fn resolve(&self, request: &AssessmentRequest) -> Option<FieldValue> {
        let text = |s: Option<&str>| s.map(|v| FieldValue::Text(v.to_string()));
        let tx = &request.transaction;
        let geo = request.context.geolocation;
        let degrees = |v: f64| Decimal::try_from(v).ok().map(FieldValue::Number);

        match self {
            FieldPath::TransactionAmount => Some(FieldValue::Number(tx.amount)),
            FieldPath::TransactionCurrency => text(Some(&tx.currency)),
            FieldPath::TransactionMerchant => text(tx.merchant.as_deref()),
            FieldPath::TransactionCategory => text(tx.category.as_deref()),
            FieldPath::TransactionPaymentMethod => text(Some(&tx.payment_method)),
            FieldPath::BeneficiaryCountry => {
                text(tx.beneficiary.as_ref().and_then(|b| b.country.as_deref()))
            }
            FieldPath::UserId => text(Some(&request.identity.user_id)),
            FieldPath::PhoneNumber => text(request.identity.phone_number.as_deref()),
            FieldPath::AccountId => text(request.identity.account_id.as_deref()),
            FieldPath::DeviceId => text(request.device.device_id.as_deref()),
            FieldPath::IpAddress => text(Some(&request.device.ip_address)),
            FieldPath::UserAgent => text(request.device.user_agent.as_deref()),
            FieldPath::Country => text(request.context.country.as_deref()),
            FieldPath::EventType => text(Some(request.context.event_type.as_str())),
            FieldPath::Latitude => geo.and_then(|g| degrees(g.lat)),
            FieldPath::Longitude => geo.and_then(|g| degrees(g.lng)),
            FieldPath::Hour => Some(FieldValue::Number(Decimal::from(request.hour()))),
        }
    }
}

/// Condition operand after shape checks
#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Scalar(Scalar),
    List(Vec<Scalar>),
}

#[derive(Debug, Clone, PartialEq)]
enum Scalar {
    Number(Decimal),
    Text(String),
}

impl Scalar {
    fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::String(s) => Some(Scalar::Text(s.clone())),
            Value::Number(n) => json_decimal(n).map(Scalar::Number),
            _ => None,
        }
    }

    fn equals(&self, field: &FieldValue) -> bool {
        match (field, self) {
            (FieldValue::Number(f), Scalar::Number(v)) => f == v,
            (FieldValue::Number(f), Scalar::Text(v)) => {
                Decimal::from_str(v.trim()).is_ok_and(|v| *f == v)
            }
            (FieldValue::Text(f), Scalar::Text(v)) => f == v,
            (FieldValue::Text(f), Scalar::Number(v)) => *f == v.to_string(),
        }
    }
}

fn json_decimal(n: &serde_json::Number) -> Option<Decimal> {
    let raw = n.to_string();
    Decimal::from_str(&raw)
        .or_else(|_| Decimal::from_scientific(&raw))
        .ok()
}

/// Condition checked against the closed field set and operator shapes
#[derive(Debug, Clone)]
struct CompiledCondition {
    field: FieldPath,
    operator: Operator,
    operand: Operand,
}

impl CompiledCondition {
    fn compile(condition: &Condition) -> Result<Self> {
        let field: FieldPath = condition.field.parse()?;
        let op = condition.operator;
        let shape_error = || {
            Error::InvalidRule(format!(
                "operator '{}' cannot take {} on '{}'",
                op.as_str(),
                condition.value,
                condition.field
            ))
        };

        let operand = match op {
            Operator::GreaterThan | Operator::LessThan => {
                if !field.is_numeric() {
                    return Err(shape_error());
                }
                match &condition.value {
                    Value::Number(n) => {
                        Operand::Scalar(Scalar::Number(json_decimal(n).ok_or_else(shape_error)?))
                    }
                    _ => return Err(shape_error()),
                }
            }
            Operator::Equal | Operator::NotEqual => {
                Operand::Scalar(Scalar::from_json(&condition.value).ok_or_else(shape_error)?)
            }
            Operator::Contains | Operator::NotContains => match &condition.value {
                Value::String(s) => Operand::Scalar(Scalar::Text(s.clone())),
                _ => return Err(shape_error()),
            },
            Operator::In | Operator::NotIn => match &condition.value {
                Value::Array(items) => Operand::List(
                    items
                        .iter()
                        .map(Scalar::from_json)
                        .collect::<Option<Vec<_>>>()
                        .ok_or_else(shape_error)?,
                ),
                _ => return Err(shape_error()),
            },
        };

        Ok(Self {
            field,
            operator: op,
            operand,
        })
    }

    fn matches(&self, request: &AssessmentRequest) -> bool {
        let Some(value) = self.field.resolve(request) else {
            return false;
        };

        match (self.operator, &self.operand) {
            (Operator::GreaterThan, Operand::Scalar(Scalar::Number(limit))) => {
                matches!(value, FieldValue::Number(v) if v > *limit)
            }
            (Operator::LessThan, Operand::Scalar(Scalar::Number(limit))) => {
                matches!(value, FieldValue::Number(v) if v < *limit)
            }
            (Operator::Equal, Operand::Scalar(expected)) => expected.equals(&value),
            (Operator::NotEqual, Operand::Scalar(expected)) => !expected.equals(&value),
            (Operator::Contains, Operand::Scalar(Scalar::Text(needle))) => {
                text_of(&value).contains(needle.as_str())
            }
            (Operator::NotContains, Operand::Scalar(Scalar::Text(needle))) => {
                !text_of(&value).contains(needle.as_str())
            }
            (Operator::In, Operand::List(items)) => items.iter().any(|i| i.equals(&value)),
            (Operator::NotIn, Operand::List(items)) => !items.iter().any(|i| i.equals(&value)),
            // compile() never pairs operators with other operand shapes
            _ => false,
        }
    }
}

fn text_of(value: &FieldValue) -> String {
    match value {
        FieldValue::Number(n) => n.to_string(),
        FieldValue::Text(s) => s.clone(),
    }
}

impl Rule {
    /// Check the rule against the closed field set and operator shapes
    pub fn validate(&self) -> Result<()> {
        self.compile().map(|_| ())
    }

    fn compile(&self) -> Result<Vec<CompiledCondition>> {
        if self.conditions.is_empty() {
            return Err(Error::InvalidRule(format!("rule '{}' has no conditions", self.name)));
        }
        self.conditions.iter().map(CompiledCondition::compile).collect()
    }

    /// `Ok(true)` when every condition matches
    pub fn matches(&self, request: &AssessmentRequest) -> Result<bool> {
        let conditions = self.compile()?;
        Ok(conditions.iter().all(|c| c.matches(request)))
    }
}

/// Outcome of running the rule set over one request
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleEvaluation {
    /// Names of triggered rules, in rule-set order
    pub triggered: Vec<String>,
    pub should_block: bool,
    pub should_review: bool,
}

/// Evaluate rules against a request; malformed rules are skipped
pub fn evaluate(request: &AssessmentRequest, rules: &[Rule]) -> RuleEvaluation {
    let mut evaluation = RuleEvaluation::default();

    for rule in rules.iter().filter(|r| r.enabled) {
        match rule.matches(request) {
            Ok(true) => {
                debug!(rule = %rule.name, action = ?rule.action, "Rule triggered");
                evaluation.triggered.push(rule.name.clone());
                match rule.action {
                    Action::Block => evaluation.should_block = true,
                    Action::Review => evaluation.should_review = true,
                }
            }
            Ok(false) => {}
            Err(e) => warn!(rule = %rule.name, error = %e, "Skipping malformed rule"),
        }
    }

    evaluation
}

/// Loaded operator rules
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RuleSet {
    rules: Vec<Rule>,
}

impl RuleSet {
    pub fn new(rules: Vec<Rule>) -> Self {
        Self { rules }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Parse a JSON array of rules. Elements that fail to parse are logged
    /// and skipped; the rest load.
    pub fn from_json(content: &str) -> Result<Self> {
        let items: Vec<Value> = serde_json::from_str(content)?;
        let mut rules = Vec::with_capacity(items.len());

        for (index, item) in items.into_iter().enumerate() {
            match serde_json::from_value::<Rule>(item) {
                Ok(rule) => {
                    if let Err(e) = rule.validate() {
                        warn!(
                            index,
                            rule = %rule.name,
                            error = %e,
                            "Loaded malformed rule; it will never fire"
                        );
                    }
                    rules.push(rule);
                }
                Err(e) => warn!(index, error = %e, "Skipping unparseable rule"),
            }
        }

        Ok(Self { rules })
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_json(&content)
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn evaluate(&self, request: &AssessmentRequest) -> RuleEvaluation {
        evaluate(request, &self.rules)
    }
}
