use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use chrono::{DateTime, TimeZone};
use log::debug;
use crate::error::{ScheduleError, ScheduleResult};

const DAY_NAMES: [&str; 7] = ["Sun", "Mon", "Tue", "Wed", "Thu", "Fri", "Sat"];

/// Campi di un'espressione cron a 5 campi
#[derive(Debug, Clone, Copy, PartialEq)]
enum Field {
    Minute,
    Hour,
    DayOfMonth,
    Month,
    DayOfWeek,
}

impl Field {
    const ALL: [Field; 5] = [Field::Minute, Field::Hour, Field::DayOfMonth, Field::Month, Field::DayOfWeek];

    fn name(self) -> &'static str {
        match self {
            Field::Minute => "minute",
            Field::Hour => "hour",
            Field::DayOfMonth => "day-of-month",
            Field::Month => "month",
            Field::DayOfWeek => "day-of-week",
        }
    }

    fn bounds(self) -> (u32, u32) {
        match self {
            Field::Minute => (0, 59),
            Field::Hour => (0, 23),
            Field::DayOfMonth => (1, 31),
            Field::Month => (1, 12),
            Field::DayOfWeek => (0, 6),
        }
    }

    // `H` da solo non sceglie mai 29-31, così scatta tutti i mesi
    fn hash_bounds(self) -> (u32, u32) {
        match self {
            Field::DayOfMonth => (1, 28),
            other => other.bounds(),
        }
    }
}

/// Schedule cron nel dialetto Jenkins: 5 campi, token `H`, alias `@daily` & co.
///
/// Internamente viene tradotto nel formato a 7 campi del crate `cron`
/// (secondi e anno aggiunti, giorni della settimana per nome).
/// Se giorno del mese e giorno della settimana sono entrambi ristretti basta che
/// ne corrisponda uno (come in Jenkins), mentre `cron` li richiede entrambi:
/// in quel caso teniamo due schedule e ne uniamo gli istanti.
#[derive(Debug, Clone)]
pub struct CronSchedule {
    expression: String,
    normalized: String,
    schedules: Vec<cron::Schedule>,
}

impl CronSchedule {
    /// Il nome del job è il seme per i token `H`: stesso job, stessi orari
    pub fn parse(expression: &str, job_name: &str) -> ScheduleResult<Self> {
        let trimmed = expression.trim();
        let source = if trimmed.starts_with('@') {
            expand_alias(trimmed).ok_or_else(|| ScheduleError::invalid(expression, format!("unknown alias '{trimmed}'")))?
        } else {
            trimmed
        };

        let fields: Vec<&str> = source.split_whitespace().collect();
        if fields.len() != Field::ALL.len() {
            return Err(ScheduleError::invalid(
                expression,
                format!(
                    "expected 5 fields (minute hour day-of-month month day-of-week), found {}",
                    fields.len()
                ),
            ));
        }

        let mut translated = Vec::with_capacity(7);
        translated.push("0".to_string());
        for (index, (field, value)) in Field::ALL.iter().zip(&fields).enumerate() {
            let seed = job_hash(job_name, index);
            let field_error = |message: String| ScheduleError::invalid(expression, format!("{} field: {}", field.name(), message));

            let terms = value.split(',')
                .map(|term| resolve_hash(term, *field, seed))
                .collect::<Result<Vec<_>, _>>()
                .map_err(field_error)?;
            let value = match field {
                Field::DayOfWeek => day_of_week(&terms).map_err(field_error)?,
                _ => terms.join(","),
            };
            translated.push(value);
        }
        translated.push("*".to_string());

        let variants = if is_restricted(&translated[3]) && is_restricted(&translated[5]) {
            let mut by_month_day = translated.clone();
            by_month_day[5] = "*".to_string();
            let mut by_week_day = translated;
            by_week_day[3] = "*".to_string();
            vec![by_month_day.join(" "), by_week_day.join(" ")]
        } else {
            vec![translated.join(" ")]
        };

        let schedules = variants.iter()
            .map(|it| cron::Schedule::from_str(it).map_err(|e| ScheduleError::invalid(expression, e.to_string())))
            .collect::<ScheduleResult<Vec<_>>>()?;
        let normalized = variants.join(" | ");
        debug!("Schedule '{}' for job '{}' normalized to '{}'", expression, job_name, normalized);

        Ok(Self {
            expression: expression.to_string(),
            normalized,
            schedules,
        })
    }

    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Forma a 7 campi passata al crate `cron` (due forme separate da ` | ` per l'OR dei giorni)
    pub fn normalized(&self) -> &str {
        &self.normalized
    }

    pub fn matches<Tz: TimeZone>(&self, at: &DateTime<Tz>) -> bool {
        self.schedules.iter().any(|it| it.includes(at.clone()))
    }

    /// Primo istante strettamente successivo a `after`
    pub fn next_after<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        self.schedules.iter()
            .filter_map(|it| it.after(after).next())
        .min()
    }

    pub fn upcoming<Tz: TimeZone>(&self, from: &DateTime<Tz>, count: usize) -> Vec<DateTime<Tz>> {
        // I primi `count` dell'unione stanno tra i primi `count` di ciascuno schedule
        let mut merged = self.merge(|it| it.after(from).take(count).collect());
        merged.truncate(count);
        merged
    }

    /// Istanti in `(from, until]`
    pub fn fire_times_between<Tz: TimeZone>(&self, from: &DateTime<Tz>, until: &DateTime<Tz>) -> Vec<DateTime<Tz>> {
        self.merge(|it| it.after(from).take_while(|at| at <= until).collect())
    }

    fn merge<Tz, F>(&self, times: F) -> Vec<DateTime<Tz>>
    where
        Tz: TimeZone,
        F: Fn(&cron::Schedule) -> Vec<DateTime<Tz>>,
    {
        let mut merged: Vec<DateTime<Tz>> = self.schedules.iter().flat_map(times).collect();
        merged.sort();
        merged.dedup();
        merged
    }
}

impl fmt::Display for CronSchedule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.expression)
    }
}

/// Un campo che inizia con `*` non restringe i giorni
fn is_restricted(field: &str) -> bool {
    !field.starts_with('*')
}

fn expand_alias(alias: &str) -> Option<&'static str> {
    let expanded = match alias.to_ascii_lowercase().as_str() {
        "@yearly" | "@annually" => "H H H H *",
        "@monthly" => "H H H * *",
        "@weekly" => "H H * * H",
        "@daily" => "H H * * *",
        "@midnight" => "H H(0-2) * * *",
        "@hourly" => "H * * * *",
        _ => return None,
    };
    Some(expanded)
}

/// FNV-1a del nome del job, mescolato con l'indice del campo
fn job_hash(job_name: &str, field_index: usize) -> u64 {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in job_name.bytes().chain(std::iter::once(field_index as u8)) {
        hash ^= byte as u64;
        hash = hash.wrapping_mul(0x0100_0000_01b3);
    }
    hash
}

fn parse_number(value: &str) -> Result<u32, String> {
    value.trim().parse::<u32>().map_err(|_| format!("'{value}' is not a number"))
}

/// Sostituisce `H`, `H(a-b)`, `H/n`, `H(a-b)/n` con valori concreti; gli altri termini passano invariati
fn resolve_hash(term: &str, field: Field, seed: u64) -> Result<String, String> {
    let Some(rest) = term.strip_prefix('H') else {
        return Ok(term.to_string());
    };
    let (range, step) = match rest.split_once('/') {
        Some((range, step)) => (range, Some(parse_number(step)?)),
        None => (rest, None),
    };

    let (low, high) = if range.is_empty() {
        if step.is_some() { field.bounds() } else { field.hash_bounds() }
    } else {
        let inner = range.strip_prefix('(')
            .and_then(|it| it.strip_suffix(')'))
            .ok_or_else(|| format!("malformed hash token '{term}'"))?;
        let (low, high) = inner.split_once('-')
            .ok_or_else(|| format!("hash range in '{term}' must be 'H(a-b)'"))?;
        let (low, high) = (parse_number(low)?, parse_number(high)?);
        let (min, max) = field.bounds();
        if low > high || low < min || high > max {
            return Err(format!("hash range in '{term}' must lie within {min}-{max}"));
        }
        (low, high)
    };

    let span = (high - low + 1) as u64;
    match step {
        None => Ok((low as u64 + seed % span).to_string()),
        Some(0) => Err(format!("step in '{term}' must be positive")),
        Some(step) => {
            let start = low as u64 + seed % (step as u64).min(span);
            Ok(format!("{start}-{high}/{step}"))
        }
    }
}

fn parse_day(value: &str) -> Result<u32, String> {
    if let Ok(number) = value.parse::<u32>() {
        return if number <= 7 {
            Ok(number)
        } else {
            Err(format!("day of week {number} is out of range 0-7"))
        };
    }
    DAY_NAMES.iter()
        .position(|name| name.eq_ignore_ascii_case(value))
        .map(|it| it as u32)
        .ok_or_else(|| format!("unknown day of week '{value}'"))
}

/// Espande i giorni in una lista di nomi: il crate `cron` numera da 1 (domenica),
/// Jenkins da 0 e accetta anche 7 per la domenica.
fn day_of_week(terms: &[String]) -> Result<String, String> {
    if terms.len() == 1 && terms[0] == "*" {
        return Ok("*".to_string());
    }

    let mut days = BTreeSet::new();
    for term in terms {
        let (base, step) = match term.split_once('/') {
            Some((base, step)) => (base, parse_number(step)?),
            None => (term.as_str(), 1),
        };
        if step == 0 {
            return Err(format!("step in '{term}' must be positive"));
        }

        let (first, last) = match base.split_once('-') {
            _ if base == "*" => (0, 6),
            Some((first, last)) => (parse_day(first)?, parse_day(last)?),
            None if term.contains('/') => (parse_day(base)?, 6),
            None => {
                let day = parse_day(base)?;
                (day, day)
            }
        };
        if first > last {
            return Err(format!("range '{base}' is reversed"));
        }
        days.extend((first..=last).step_by(step as usize).map(|day| day % 7));
    }

    Ok(days.into_iter()
        .map(|day| DAY_NAMES[day as usize])
        .collect::<Vec<_>>()
        .join(","))
}
