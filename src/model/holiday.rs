use chrono::{Datelike, NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow, ToSchema)]
pub struct Holiday {
    #[schema(example = 4)]
    pub id: u64,
    #[schema(example = "2024-04-09", value_type = String, format = "date")]
    pub holiday_date: NaiveDate,
    #[schema(example = "Araw ng Kagitingan")]
    pub holiday_name: String,
    pub description: Option<String>,
    pub is_recurring: bool,
    /// date the holiday was first entered; recurrences keep its month and day
    #[schema(value_type = Option<String>, format = "date")]
    pub original_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub created_at: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub updated_at: Option<NaiveDateTime>,
}

/// Stored holidays carry their row id; synthesized recurrences a
/// `recurring_{id}_{year}` key.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum HolidayKey {
    Stored(u64),
    Generated(String),
}

#[derive(Debug, Clone, PartialEq, Serialize, ToSchema)]
pub struct HolidayEntry {
    #[schema(value_type = String, example = "recurring_3_2024")]
    pub id: HolidayKey,
    #[schema(value_type = String, format = "date")]
    pub holiday_date: NaiveDate,
    pub holiday_name: String,
    pub description: Option<String>,
    pub is_recurring: bool,
    #[schema(value_type = Option<String>, format = "date")]
    pub original_date: Option<NaiveDate>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub created_at: Option<NaiveDateTime>,
    #[schema(value_type = Option<String>, format = "date-time")]
    pub updated_at: Option<NaiveDateTime>,
    pub is_generated: bool,
}

impl From<Holiday> for HolidayEntry {
    fn from(h: Holiday) -> Self {
        Self {
            id: HolidayKey::Stored(h.id),
            holiday_date: h.holiday_date,
            holiday_name: h.holiday_name,
            description: h.description,
            is_recurring: h.is_recurring,
            original_date: h.original_date,
            created_at: h.created_at,
            updated_at: h.updated_at,
            is_generated: false,
        }
    }
}

impl Holiday {
    pub fn anchor_date(&self) -> NaiveDate {
        self.original_date.unwrap_or(self.holiday_date)
    }

    /// `None` when the anchor day does not exist in `year` (Feb 29).
    pub fn recurrence_in(&self, year: i32) -> Option<NaiveDate> {
        let anchor = self.anchor_date();
        NaiveDate::from_ymd_opt(year, anchor.month(), anchor.day())
    }
}

/// First and last day of `month`/`year`, or of `today`'s month when the pair
/// is missing or out of range.
pub fn month_range(month: Option<u32>, year: Option<i32>, today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let (year, month) = match (year, month) {
        (Some(y), Some(m)) if (1..=12).contains(&m) && (1970..=9999).contains(&y) => (y, m),
        _ => (today.year(), today.month()),
    };

    let first = NaiveDate::from_ymd_opt(year, month, 1).unwrap_or(today);
    let next_month = if month == 12 {
        NaiveDate::from_ymd_opt(year + 1, 1, 1)
    } else {
        NaiveDate::from_ymd_opt(year, month + 1, 1)
    };
    let last = next_month.and_then(|d| d.pred_opt()).unwrap_or(first);

    (first, last)
}

/// Stored holidays in `[start, end]` plus one synthesized occurrence per
/// recurring holiday in `start`'s year, unless a stored holiday already has
/// that date and name. Sorted by date.
pub fn expand_recurring(
    actual: Vec<Holiday>,
    recurring: &[Holiday],
    start: NaiveDate,
    end: NaiveDate,
) -> Vec<HolidayEntry> {
    let year = start.year();

    let generated: Vec<HolidayEntry> = recurring
        .iter()
        .filter_map(|template| {
            let date = template.recurrence_in(year)?;
            let in_range = start <= date && date <= end;
            let exists = actual
                .iter()
                .any(|h| h.holiday_date == date && h.holiday_name == template.holiday_name);
            if !in_range || exists {
                return None;
            }

            Some(HolidayEntry {
                id: HolidayKey::Generated(format!("recurring_{}_{}", template.id, year)),
                holiday_date: date,
                holiday_name: template.holiday_name.clone(),
                description: template.description.clone(),
                is_recurring: true,
                original_date: Some(template.anchor_date()),
                created_at: None,
                updated_at: None,
                is_generated: true,
            })
        })
        .collect();

    let mut entries: Vec<HolidayEntry> = actual.into_iter().map(HolidayEntry::from).collect();
    entries.extend(generated);
    entries.sort_by_key(|e| e.holiday_date);
    entries
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateHoliday {
    #[schema(example = "2024-04-09")]
    pub holiday_date: Option<String>,
    #[schema(example = "Araw ng Kagitingan")]
    pub holiday_name: Option<String>,
    pub description: Option<String>,
    #[serde(default)]
    pub is_recurring: bool,
}

/// Only non-empty, valid fields are applied.
#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateHoliday {
    #[schema(example = "2024-04-09")]
    pub holiday_date: Option<String>,
    pub holiday_name: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateRecurring {
    #[schema(example = 2025)]
    pub year: i32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn holiday(id: u64, on: NaiveDate, name: &str, recurring: bool) -> Holiday {
        Holiday {
            id,
            holiday_date: on,
            holiday_name: name.into(),
            description: None,
            is_recurring: recurring,
            original_date: Some(on),
            created_at: None,
            updated_at: None,
        }
    }

    #[test]
    fn recurring_holiday_is_not_duplicated() {
        let template = holiday(1, date(2020, 6, 12), "Independence Day", true);
        let stored = holiday(9, date(2024, 6, 12), "Independence Day", false);

        let entries = expand_recurring(
            vec![stored],
            &[template],
            date(2024, 6, 1),
            date(2024, 6, 30),
        );

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, HolidayKey::Stored(9));
    }

    #[test]
    fn recurrences_are_synthesized_in_range_and_sorted() {
        let rizal = holiday(3, date(2019, 12, 30), "Rizal Day", true);
        let xmas = holiday(2, date(2019, 12, 25), "Christmas Day", true);
        let midsummer = holiday(4, date(2019, 6, 24), "Manila Day", true);
        let company = holiday(7, date(2024, 12, 27), "Company Day", false);

        let entries = expand_recurring(
            vec![company],
            &[rizal, xmas, midsummer],
            date(2024, 12, 1),
            date(2024, 12, 31),
        );

        let dates: Vec<_> = entries.iter().map(|e| e.holiday_date).collect();
        assert_eq!(dates, vec![date(2024, 12, 25), date(2024, 12, 27), date(2024, 12, 30)]);
        assert_eq!(entries[0].id, HolidayKey::Generated("recurring_2_2024".into()));
        assert!(entries[0].is_generated);
        assert_eq!(entries[0].original_date, Some(date(2019, 12, 25)));
    }

    #[test]
    fn leap_day_has_no_recurrence_in_common_years() {
        let leap = holiday(5, date(2024, 2, 29), "Leap Day", true);

        assert_eq!(leap.recurrence_in(2025), None);
        assert_eq!(leap.recurrence_in(2028), Some(date(2028, 2, 29)));
    }

    #[test]
    fn month_range_defaults_to_current_month() {
        let today = date(2024, 2, 10);

        assert_eq!(month_range(Some(12), Some(2023), today), (date(2023, 12, 1), date(2023, 12, 31)));
        assert_eq!(month_range(None, None, today), (date(2024, 2, 1), date(2024, 2, 29)));
        assert_eq!(month_range(Some(13), Some(2024), today), (date(2024, 2, 1), date(2024, 2, 29)));
        assert_eq!(month_range(Some(5), Some(1969), today).0, date(2024, 2, 1));
    }

    #[test]
    fn generated_key_serializes_as_string() {
        let json = serde_json::to_value(HolidayKey::Generated("recurring_1_2024".into())).unwrap();
        assert_eq!(json, serde_json::json!("recurring_1_2024"));
        assert_eq!(serde_json::to_value(HolidayKey::Stored(4)).unwrap(), serde_json::json!(4));
    }
}
