use crate::config::IngestConfig;
use crate::ingest::CellOrigin;
use crate::types::*;
use regex::Regex;
use std::sync::LazyLock;

const CURRENCY_SYMBOLS: &str = "$€£¥₽";

// Grouped thousands ("1,234,567.89", "1 234,5") or a plain number with an
// optional decimal part using either separator.
const AMOUNT: &str = r"(?:\d{1,3}(?:[ ,]\d{3})+(?:[.,]\d+)?|\d+(?:[.,]\d+)?)";

static SCIENTIFIC_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^-?\d+(\.\d+)?e[+-]?\d+$").unwrap());
static PERCENTAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^-?\d+([.,]\d+)?%$").unwrap());
static CURRENCY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r"(?i)^(?:[-+]?[{sym}]\s?[-+]?{AMOUNT}[kmbt]?|[-+]?{AMOUNT}[kmbt]|[-+]?{AMOUNT}\s?[{sym}])$",
        sym = CURRENCY_SYMBOLS
    ))
    .unwrap()
});
static FORMULA_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^=").unwrap());
static ISO_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{4}[-/.]\d{2}[-/.]\d{2}$").unwrap());
static DMY_DATE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d{2}[-/.]\d{2}[-/.]\d{4}$").unwrap());
static QUARTER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)^Q[1-4]\s*\d{4}$").unwrap());
static NUMBER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[-+]?\d+([.,]\d+)?$").unwrap());

static YEAR_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(19|20)\d{2}$").unwrap());
static MONTH_YEAR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?i)^(?:(?:0?[1-9]|1[0-2])[-/.]\d{4}|(?:jan|feb|mar|apr|may|jun|jul|aug|sep|oct|nov|dec|янв|фев|мар|апр|май|мая|июн|июл|авг|сен|окт|ноя|дек)[a-zа-я]*\.?\s+\d{4})$",
    )
    .unwrap()
});

/// Ordered text rules; the first matching pattern decides the type.
/// Percentage and currency must stay ahead of the plain number rule.
static TEXT_RULES: LazyLock<Vec<(&'static LazyLock<Regex>, CellType)>> = LazyLock::new(|| {
    vec![
        (&SCIENTIFIC_RE, CellType::Number),
        (&PERCENTAGE_RE, CellType::Percentage),
        (&CURRENCY_RE, CellType::Currency),
        (&FORMULA_RE, CellType::Formula),
        (&ISO_DATE_RE, CellType::Date),
        (&DMY_DATE_RE, CellType::Date),
        (&QUARTER_RE, CellType::Date),
        (&NUMBER_RE, CellType::Number),
    ]
});

/// Assigns a `CellType` to any scalar, independent of where it sits.
#[derive(Debug, Clone)]
pub struct CellClassifier {
    serial_date_min: f64,
    serial_date_max: f64,
}

impl Default for CellClassifier {
    fn default() -> Self {
        Self::new(&IngestConfig::default())
    }
}

impl CellClassifier {
    pub fn new(config: &IngestConfig) -> Self {
        Self {
            serial_date_min: config.serial_date_min,
            serial_date_max: config.serial_date_max,
        }
    }

    fn is_serial_date(&self, n: f64) -> bool {
        n > self.serial_date_min && n < self.serial_date_max
    }

    pub fn classify(&self, value: &Scalar) -> CellType {
        match value {
            Scalar::Empty => CellType::Empty,
            Scalar::Date(_) => CellType::Date,
            Scalar::Number(n) if !n.is_finite() => CellType::Empty,
            Scalar::Number(n) if self.is_serial_date(*n) => CellType::Date,
            Scalar::Number(_) => CellType::Number,
            Scalar::Text(s) => {
                let s = s.trim();
                if s.is_empty() {
                    return CellType::Empty;
                }
                TEXT_RULES
                    .iter()
                    .find(|(re, _)| re.is_match(s))
                    .map(|(_, cell_type)| *cell_type)
                    .unwrap_or(CellType::Text)
            }
        }
    }

    /// Build a cell whose type and derived metadata agree with `value`.
    pub fn cell(&self, value: Scalar) -> Cell {
        let cell_type = self.classify(&value);
        let metadata = self.derive_metadata(&value, cell_type);
        Cell {
            value,
            cell_type,
            metadata,
        }
    }

    /// Like `classify`, for a sanitized value whose origin is known.
    /// Numbers parsed out of text classify by their text form, so they
    /// never read as serial dates.
    pub fn classify_sanitized(&self, value: &Scalar, origin: CellOrigin) -> CellType {
        match (origin, value) {
            (CellOrigin::NumericText, Scalar::Number(n)) if n.is_finite() => CellType::Number,
            _ => self.classify(value),
        }
    }

    /// Build a cell from a sanitized grid value.
    pub fn sanitized_cell(&self, value: Scalar, origin: CellOrigin) -> Cell {
        let cell_type = self.classify_sanitized(&value, origin);
        let metadata = self.derive_metadata(&value, cell_type);
        Cell {
            value,
            cell_type,
            metadata,
        }
    }

    pub fn derive_metadata(&self, value: &Scalar, cell_type: CellType) -> CellMetadata {
        let mut metadata = CellMetadata::default();
        match cell_type {
            CellType::Number => {
                metadata.precision = Some(precision_of(value));
                metadata.numeric_value = Some(match value {
                    Scalar::Text(s) if SCIENTIFIC_RE.is_match(s.trim()) => s
                        .trim()
                        .parse::<f64>()
                        .ok()
                        .filter(|n| n.is_finite())
                        .unwrap_or(0.0),
                    other => parse_amount(other),
                });
            }
            CellType::Percentage => {
                metadata.precision = Some(precision_of(value));
                metadata.numeric_value = Some(parse_amount(value) / 100.0);
            }
            CellType::Currency => {
                let text = value.to_string();
                metadata.currency_symbol = text
                    .chars()
                    .find(|c| CURRENCY_SYMBOLS.contains(*c))
                    .map(String::from);
                metadata.numeric_value = Some(parse_amount(value) * magnitude_multiplier(&text));
            }
            CellType::Date => {
                metadata.date_format = Some(self.date_format(value));
            }
            CellType::Formula => {
                metadata.formula = value.as_text().map(|s| s.trim().to_string());
            }
            CellType::Empty | CellType::Text => {}
        }
        metadata
    }

    /// Coarse granularity of a date-like value: year-only, month-year,
    /// quarter-year, then full date.
    pub fn date_format(&self, value: &Scalar) -> DateFormat {
        match value {
            Scalar::Date(_) => DateFormat::Daily,
            Scalar::Number(n) if self.is_serial_date(*n) => DateFormat::Daily,
            Scalar::Number(n) => date_format_of_text(&format_number(*n)),
            Scalar::Text(s) => date_format_of_text(s.trim()),
            Scalar::Empty => DateFormat::Unknown,
        }
    }
}

pub fn date_format_of_text(s: &str) -> DateFormat {
    if YEAR_RE.is_match(s) {
        DateFormat::Yearly
    } else if MONTH_YEAR_RE.is_match(s) {
        DateFormat::Monthly
    } else if QUARTER_RE.is_match(s) {
        DateFormat::Quarterly
    } else if ISO_DATE_RE.is_match(s) || DMY_DATE_RE.is_match(s) {
        DateFormat::Daily
    } else {
        DateFormat::Unknown
    }
}

fn precision_of(value: &Scalar) -> u32 {
    let text = match value {
        Scalar::Number(n) => format_number(*n),
        other => other.to_string(),
    };
    let digits: &str = text.trim().trim_end_matches('%');
    digits
        .rfind(['.', ','])
        .map(|i| digits[i + 1..].chars().filter(char::is_ascii_digit).count() as u32)
        .unwrap_or(0)
}

fn magnitude_multiplier(text: &str) -> f64 {
    let suffix = text
        .trim()
        .trim_end_matches(|c: char| CURRENCY_SYMBOLS.contains(c) || c.is_whitespace())
        .chars()
        .last()
        .map(|c| c.to_ascii_lowercase());
    match suffix {
        Some('k') => 1e3,
        Some('m') => 1e6,
        Some('b') => 1e9,
        Some('t') => 1e12,
        _ => 1.0,
    }
}

/// Best-effort numeric reading of a locale-formatted amount.
///
/// Accepts both `1 234,56` and `1,234.56`. Anything unreadable is `0.0`.
pub fn parse_amount(value: &Scalar) -> f64 {
    match value {
        Scalar::Number(n) if n.is_finite() => *n,
        Scalar::Text(s) => parse_amount_str(s),
        _ => 0.0,
    }
}

pub fn parse_amount_str(raw: &str) -> f64 {
    let kept: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || matches!(c, '-' | ',' | '.'))
        .collect();
    let negative = kept.starts_with('-');
    let body = kept.trim_start_matches('-');
    if body.is_empty() || body.contains('-') {
        return 0.0;
    }

    let normalized = match (body.rfind(','), body.rfind('.')) {
        // Both separators: whichever comes last is the decimal point.
        (Some(comma), Some(dot)) if comma > dot => body.replace('.', "").replace(',', "."),
        (Some(_), Some(_)) => body.replace(',', ""),
        (Some(_), None) => {
            if body.matches(',').count() > 1 || is_thousands_group(body, ',') {
                body.replace(',', "")
            } else {
                body.replace(',', ".")
            }
        }
        (None, Some(_)) if body.matches('.').count() > 1 => body.replace('.', ""),
        _ => body.to_string(),
    };

    match normalized.parse::<f64>() {
        Ok(n) if n.is_finite() => {
            if negative {
                -n
            } else {
                n
            }
        }
        _ => 0.0,
    }
}

/// `1,234` style: one to three leading digits, then exactly three.
fn is_thousands_group(body: &str, sep: char) -> bool {
    match body.split_once(sep) {
        Some((lead, tail)) => (1..=3).contains(&lead.len()) && tail.len() == 3,
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn classify(value: impl Into<Scalar>) -> CellType {
        CellClassifier::default().classify(&value.into())
    }

    #[test]
    fn first_match_wins_over_text_rules() {
        assert_eq!(classify("15%"), CellType::Percentage);
        assert_eq!(classify("$1,234.56"), CellType::Currency);
        assert_eq!(classify("1 234,56 ₽"), CellType::Currency);
        assert_eq!(classify("-€5k"), CellType::Currency);
        assert_eq!(classify("2.5M"), CellType::Currency);
        assert_eq!(classify("1000,50"), CellType::Number);
        assert_eq!(classify("1.2E+5"), CellType::Number);
        assert_eq!(classify("=A1+B1"), CellType::Formula);
        assert_eq!(classify("2023-01-31"), CellType::Date);
        assert_eq!(classify("31.01.2023"), CellType::Date);
        assert_eq!(classify("Q3 2023"), CellType::Date);
        assert_eq!(classify("Revenue"), CellType::Text);
        assert_eq!(classify("   "), CellType::Empty);
        assert_eq!(classify(Scalar::Empty), CellType::Empty);
    }

    #[test]
    fn native_values_classify_structurally() {
        assert_eq!(classify(1_000_000.0), CellType::Number);
        assert_eq!(classify(44927.0), CellType::Date);
        assert_eq!(classify(25569.0), CellType::Number);
        assert_eq!(classify(NaiveDate::from_ymd_opt(2024, 2, 29).unwrap()), CellType::Date);
    }

    #[test]
    fn numbers_read_from_text_are_never_serial_dates() {
        let classifier = CellClassifier::default();
        let value = Scalar::Number(35000.0);

        let cell = classifier.sanitized_cell(value.clone(), CellOrigin::NumericText);
        assert_eq!(cell.cell_type, CellType::Number);
        assert_eq!(cell.metadata.numeric_value, Some(35000.0));

        assert_eq!(classifier.classify_sanitized(&value, CellOrigin::Value), CellType::Date);
        assert_eq!(
            classifier.classify_sanitized(&Scalar::text("=A1"), CellOrigin::Formula),
            CellType::Formula
        );
    }

    #[test]
    fn derived_metadata_for_numeric_kinds() {
        let classifier = CellClassifier::default();

        let pct = classifier.cell(Scalar::text("29.2%"));
        assert_eq!(pct.metadata.precision, Some(1));
        assert!((pct.metadata.numeric_value.unwrap() - 0.292).abs() < 1e-9);

        let money = classifier.cell(Scalar::text("$2.5k"));
        assert_eq!(money.metadata.currency_symbol.as_deref(), Some("$"));
        assert_eq!(money.metadata.numeric_value, Some(2500.0));

        let number = classifier.cell(Scalar::text("1000,50"));
        assert_eq!(number.metadata.numeric_value, Some(1000.5));
        assert_eq!(number.metadata.precision, Some(2));

        let formula = classifier.cell(Scalar::text("=SUM(B2:B4)"));
        assert_eq!(formula.metadata.formula.as_deref(), Some("=SUM(B2:B4)"));
    }

    #[test]
    fn date_format_precedence() {
        assert_eq!(date_format_of_text("2023"), DateFormat::Yearly);
        assert_eq!(date_format_of_text("03/2023"), DateFormat::Monthly);
        assert_eq!(date_format_of_text("March 2023"), DateFormat::Monthly);
        assert_eq!(date_format_of_text("Q1 2023"), DateFormat::Quarterly);
        assert_eq!(date_format_of_text("2023-03-01"), DateFormat::Daily);
        assert_eq!(date_format_of_text("soon"), DateFormat::Unknown);
    }

    #[test]
    fn parse_amount_handles_both_locales() {
        assert_eq!(parse_amount_str("1 234,56"), 1234.56);
        assert_eq!(parse_amount_str("1,234.56"), 1234.56);
        assert_eq!(parse_amount_str("1.234,56"), 1234.56);
        assert_eq!(parse_amount_str("1,234"), 1234.0);
        assert_eq!(parse_amount_str("12,5"), 12.5);
        assert_eq!(parse_amount_str("1,234,567"), 1_234_567.0);
        assert_eq!(parse_amount_str("-$300"), -300.0);
        assert_eq!(parse_amount_str("\u{a0}1\u{a0}000"), 1000.0);
    }

    #[test]
    fn parse_amount_defaults_to_zero() {
        assert_eq!(parse_amount(&Scalar::text("")), 0.0);
        assert_eq!(parse_amount(&Scalar::Empty), 0.0);
        assert_eq!(parse_amount(&Scalar::text("not a number")), 0.0);
        assert_eq!(parse_amount(&Scalar::text("-")), 0.0);
        assert_eq!(parse_amount(&Scalar::text("1-2")), 0.0);
    }
}
