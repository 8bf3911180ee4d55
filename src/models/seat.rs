use serde::{Deserialize, Serialize};
use sqlx::FromRow;

// Справочник мест, заполняется миграцией и не меняется сервисом.
// status исторический и не участвует в расчёте занятости
#[derive(Debug, Clone, PartialEq, Eq, FromRow, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Seat {
    pub seat_id: i64,
    pub seat_number: String,
    pub status: Option<String>,
}

/// Нормализует метку места из клиента: план этажа присылает `Square-A1`.
pub fn normalize_seat_label(label: &str) -> &str {
    let label = label.trim();
    label.strip_prefix("Square-").unwrap_or(label)
}

/// Совпадение секции по префиксу номера места, без учёта регистра.
pub fn in_section(seat_number: &str, section: &str) -> bool {
    seat_number
        .get(..section.len())
        .is_some_and(|prefix| prefix.eq_ignore_ascii_case(section))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_floor_plan_prefix() {
        assert_eq!(normalize_seat_label("Square-A1"), "A1");
        assert_eq!(normalize_seat_label(" B7 "), "B7");
    }

    #[test]
    fn section_matching_is_prefix_and_case_insensitive() {
        assert!(in_section("A16", "A"));
        assert!(in_section("a3", "A"));
        assert!(!in_section("B1", "A"));
        assert!(!in_section("A", "AB"));
    }
}
