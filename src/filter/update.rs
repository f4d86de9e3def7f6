// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Update specifications.
//!
//! ```text
//! { "title": "renamed",
//!   "startsAt": { "$sumDate": { "date": "startsAt", "number": 2, "unit": "day" } } }
//! ```
//!
//! A plain value replaces the field. `$sumDate` computes `date + number unit`s,
//! where `date` and `number` are either literals or, when given as a string,
//! a reference to another field of the same row. A string that parses as a
//! timestamp is a literal date, not a reference.
//!
//! All right-hand sides read the row as it was before the update, the same
//! way `UPDATE ... SET a = b, b = a` behaves in SQL. A reference to a null or
//! absent field yields null.

use super::sql::{quote_ident, SqlParam, SqlWriter};
use crate::record::{field, format_timestamp, from_epoch_millis, parse_timestamp, to_epoch_millis, Record};
use crate::schema::Model;
use chrono::{Months, TimeZone, Utc};
use serde_json::{Map, Value};
use thiserror::Error;

pub const SUM_DATE: &str = "$sumDate";

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum UpdateError {
    #[error("update spec must be an object")]
    NotAnObject,
    #[error("field '{field}': unknown update directive '{directive}'")]
    UnknownDirective { field: String, directive: String },
    #[error("field '{field}': malformed $sumDate ({reason})")]
    MalformedSumDate { field: String, reason: String },
    #[error("field '{field}': unknown date unit '{unit}'")]
    UnknownUnit { field: String, unit: String },
    #[error("'{0}' is not an attribute of the model")]
    UnknownField(String),
    #[error("field '{field}': {reason}")]
    InvalidOperand { field: String, reason: String },
    #[error("field '{field}': calendar units need a whole number")]
    FractionalCalendarUnit { field: String },
    #[error("field '{0}': calendar units cannot be expressed in SQL")]
    CalendarUnitInSql(String),
}

/// A `$sumDate` input.
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Current value of another field on the same row.
    Field(String),
    Literal(Value),
}

impl Operand {
    fn parse(value: &Value) -> Self {
        match value {
            Value::String(s) if parse_timestamp(s).is_none() => Self::Field(s.clone()),
            other => Self::Literal(other.clone()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DateUnit {
    Millisecond,
    Second,
    Minute,
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl DateUnit {
    pub fn parse(unit: &str) -> Option<Self> {
        let unit = unit.to_ascii_lowercase();
        if unit == "ms" {
            return Some(Self::Millisecond);
        }
        let singular = unit.strip_suffix('s').unwrap_or(&unit);
        match singular {
            "millisecond" => Some(Self::Millisecond),
            "second" | "sec" => Some(Self::Second),
            "minute" | "min" => Some(Self::Minute),
            "hour" | "h" => Some(Self::Hour),
            "day" | "d" => Some(Self::Day),
            "week" | "w" => Some(Self::Week),
            "month" => Some(Self::Month),
            "year" | "y" => Some(Self::Year),
            _ => None,
        }
    }

    /// Length in milliseconds; `None` for calendar units.
    pub fn fixed_millis(&self) -> Option<i64> {
        match self {
            Self::Millisecond => Some(1),
            Self::Second => Some(1_000),
            Self::Minute => Some(60_000),
            Self::Hour => Some(3_600_000),
            Self::Day => Some(86_400_000),
            Self::Week => Some(604_800_000),
            Self::Month | Self::Year => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldUpdate {
    Set(Value),
    SumDate {
        date: Operand,
        number: Operand,
        unit: DateUnit,
    },
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct UpdateSpec {
    fields: Vec<(String, FieldUpdate)>,
}

impl UpdateSpec {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn set(mut self, field: &str, value: impl Into<Value>) -> Self {
        self.fields.push((field.to_string(), FieldUpdate::Set(value.into())));
        self
    }

    #[must_use]
    pub fn sum_date(mut self, field: &str, date: Operand, number: Operand, unit: DateUnit) -> Self {
        self.fields
            .push((field.to_string(), FieldUpdate::SumDate { date, number, unit }));
        self
    }

    pub fn parse(value: &Value) -> Result<Self, UpdateError> {
        let map = value.as_object().ok_or(UpdateError::NotAnObject)?;
        let mut fields = Vec::with_capacity(map.len());
        for (name, update) in map {
            fields.push((name.clone(), Self::parse_field(name, update)?));
        }
        Ok(Self { fields })
    }

    fn parse_field(name: &str, value: &Value) -> Result<FieldUpdate, UpdateError> {
        let Value::Object(directive) = value else {
            return Ok(FieldUpdate::Set(value.clone()));
        };
        if let Some(args) = directive.get(SUM_DATE) {
            return Self::parse_sum_date(name, args);
        }
        match directive.keys().find(|k| k.starts_with('$')) {
            Some(unknown) => Err(UpdateError::UnknownDirective {
                field: name.to_string(),
                directive: unknown.clone(),
            }),
            None => Ok(FieldUpdate::Set(value.clone())),
        }
    }

    fn parse_sum_date(name: &str, args: &Value) -> Result<FieldUpdate, UpdateError> {
        let malformed = |reason: &str| UpdateError::MalformedSumDate {
            field: name.to_string(),
            reason: reason.to_string(),
        };
        let args: &Map<String, Value> = args.as_object().ok_or_else(|| malformed("expected an object"))?;
        let date = args.get("date").ok_or_else(|| malformed("missing 'date'"))?;
        let number = args.get("number").ok_or_else(|| malformed("missing 'number'"))?;
        let unit = args
            .get("unit")
            .and_then(Value::as_str)
            .ok_or_else(|| malformed("missing 'unit'"))?;
        let unit = DateUnit::parse(unit).ok_or_else(|| UpdateError::UnknownUnit {
            field: name.to_string(),
            unit: unit.to_string(),
        })?;
        Ok(FieldUpdate::SumDate {
            date: Operand::parse(date),
            number: Operand::parse(number),
            unit,
        })
    }

    pub fn fields(&self) -> &[(String, FieldUpdate)] {
        &self.fields
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Month / year arithmetic must be applied row by row.
    pub fn has_calendar_units(&self) -> bool {
        self.fields.iter().any(|(_, update)| {
            matches!(update, FieldUpdate::SumDate { unit, .. } if unit.fixed_millis().is_none())
        })
    }

    /// Apply to an in-memory record.
    pub fn apply(&self, record: &mut Record, model: &Model) -> Result<(), UpdateError> {
        let mut changes = Vec::with_capacity(self.fields.len());
        for (name, update) in &self.fields {
            if model.attribute(name).is_none() {
                return Err(UpdateError::UnknownField(name.clone()));
            }
            let value = match update {
                FieldUpdate::Set(value) if model.is_date(name) => {
                    to_epoch_millis(value).map(from_epoch_millis).unwrap_or_else(|| value.clone())
                }
                FieldUpdate::Set(value) => value.clone(),
                FieldUpdate::SumDate { date, number, unit } => {
                    let date = resolve_date(name, date, record)?;
                    let number = resolve_number(name, number, record)?;
                    match (date, number) {
                        (Some(date), Some(number)) => from_epoch_millis(shift(name, date, number, *unit)?),
                        _ => Value::Null,
                    }
                }
            };
            changes.push((name.clone(), value));
        }
        for (name, value) in changes {
            record.insert(name, value);
        }
        Ok(())
    }

    /// Render the `SET` list. Calendar units are rejected.
    pub fn to_sql(&self, model: &Model, writer: &mut SqlWriter) -> Result<String, UpdateError> {
        let mut assignments = Vec::with_capacity(self.fields.len());
        for (name, update) in &self.fields {
            let attr = model.attribute(name).ok_or_else(|| UpdateError::UnknownField(name.clone()))?;
            let rhs = match update {
                FieldUpdate::Set(value) => match SqlParam::from_value(value, Some(attr.kind)) {
                    Some(param) => writer.push(param),
                    None => "NULL".to_string(),
                },
                FieldUpdate::SumDate { date, number, unit } => {
                    let unit_ms = unit
                        .fixed_millis()
                        .ok_or_else(|| UpdateError::CalendarUnitInSql(name.clone()))?;
                    let date = match date {
                        Operand::Field(f) => column_ref(model, f)?,
                        Operand::Literal(Value::Null) => "NULL".to_string(),
                        Operand::Literal(v) => {
                            let ms = to_epoch_millis(v).ok_or_else(|| invalid(name, "date literal is not a timestamp"))?;
                            writer.push(SqlParam::Int(ms))
                        }
                    };
                    let number = match number {
                        Operand::Field(f) => column_ref(model, f)?,
                        Operand::Literal(Value::Null) => "NULL".to_string(),
                        Operand::Literal(v) => {
                            let n = v.as_f64().ok_or_else(|| invalid(name, "number literal is not numeric"))?;
                            fixed_delta(name, n, unit_ms)?;
                            writer.push(SqlParam::Float(n))
                        }
                    };
                    format!("({date} + CAST(ROUND({number} * {unit_ms}) AS BIGINT))")
                }
            };
            assignments.push(format!("{} = {}", quote_ident(name), rhs));
        }
        Ok(assignments.join(", "))
    }
}

fn invalid(field: &str, reason: &str) -> UpdateError {
    UpdateError::InvalidOperand {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

fn column_ref(model: &Model, name: &str) -> Result<String, UpdateError> {
    model
        .attribute(name)
        .map(|a| quote_ident(&a.name))
        .ok_or_else(|| UpdateError::UnknownField(name.to_string()))
}

fn resolve_date(target: &str, operand: &Operand, record: &Record) -> Result<Option<i64>, UpdateError> {
    let value = match operand {
        Operand::Field(f) => field(record, f),
        Operand::Literal(v) => Some(v).filter(|v| !v.is_null()),
    };
    value
        .map(|v| to_epoch_millis(v).ok_or_else(|| invalid(target, "date operand is not a timestamp")))
        .transpose()
}

fn resolve_number(target: &str, operand: &Operand, record: &Record) -> Result<Option<f64>, UpdateError> {
    let value = match operand {
        Operand::Field(f) => field(record, f),
        Operand::Literal(v) => Some(v).filter(|v| !v.is_null()),
    };
    value
        .map(|v| v.as_f64().ok_or_else(|| invalid(target, "number operand is not numeric")))
        .transpose()
}

/// `number` fixed units in milliseconds.
fn fixed_delta(target: &str, number: f64, unit_ms: i64) -> Result<i64, UpdateError> {
    let delta = (number * unit_ms as f64).round();
    // i64::MAX is not representable as f64; the bound is exclusive.
    if !delta.is_finite() || delta.abs() >= i64::MAX as f64 {
        return Err(invalid(target, "shift out of range"));
    }
    Ok(delta as i64)
}

fn shift(target: &str, millis: i64, number: f64, unit: DateUnit) -> Result<i64, UpdateError> {
    let out_of_range = || invalid(target, "shift out of range");
    if let Some(unit_ms) = unit.fixed_millis() {
        let shifted = millis
            .checked_add(fixed_delta(target, number, unit_ms)?)
            .ok_or_else(out_of_range)?;
        return Utc
            .timestamp_millis_opt(shifted)
            .single()
            .map(|_| shifted)
            .ok_or_else(out_of_range);
    }
    if number.fract() != 0.0 {
        return Err(UpdateError::FractionalCalendarUnit {
            field: target.to_string(),
        });
    }
    if !number.is_finite() || number.abs() > f64::from(u32::MAX) {
        return Err(out_of_range());
    }
    let months = (number as i64)
        .checked_mul(if unit == DateUnit::Year { 12 } else { 1 })
        .ok_or_else(out_of_range)?;
    let start = Utc
        .timestamp_millis_opt(millis)
        .single()
        .ok_or_else(|| invalid(target, "date out of range"))?;
    let step = Months::new(u32::try_from(months.unsigned_abs()).map_err(|_| out_of_range())?);
    let shifted = if months >= 0 {
        start.checked_add_months(step)
    } else {
        start.checked_sub_months(step)
    };
    shifted
        .map(|dt| dt.timestamp_millis())
        .ok_or_else(|| invalid(target, &format!("{} shifted out of range", format_timestamp(&start))))
}
