use chrono::{NaiveTime, Weekday};
use serde::{Deserialize, Serialize};

use crate::integration::store::Document;
use crate::user;

use super::{Id, ONLINE_SLOT};

const KOREAN_DAYS: [(Weekday, &str); 7] = [
    (Weekday::Sun, "일"),
    (Weekday::Mon, "월"),
    (Weekday::Tue, "화"),
    (Weekday::Wed, "수"),
    (Weekday::Thu, "목"),
    (Weekday::Fri, "금"),
    (Weekday::Sat, "토"),
];

pub fn korean_day(day: Weekday) -> &'static str {
    KOREAN_DAYS
        .iter()
        .find(|(d, _)| *d == day)
        .map(|(_, name)| *name)
        .unwrap_or_default()
}

pub fn parse_korean_day(name: &str) -> Option<Weekday> {
    KOREAN_DAYS
        .iter()
        .find(|(_, n)| *n == name)
        .map(|(day, _)| *day)
}

/// A weekly class slot such as `월 10:00-12:00`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Slot {
    pub day: Weekday,
    pub start: NaiveTime,
    pub end: NaiveTime,
}

impl Slot {
    /// Parses `<day> <H:MM>-<H:MM>`; blanks around the dash are allowed.
    /// Online lectures and anything else that does not fit yield `None`.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        if s == ONLINE_SLOT {
            return None;
        }

        let (day, range) = s.split_once(char::is_whitespace)?;
        let range = range.split_whitespace().collect::<String>();
        let (start, end) = range.split_once('-')?;

        Some(Self {
            day: parse_korean_day(day)?,
            start: parse_hour_minute(start)?,
            end: parse_hour_minute(end)?,
        })
    }

    /// `10:00-12:00`, without the day.
    pub fn time_range(&self) -> String {
        format!("{}-{}", self.start.format("%H:%M"), self.end.format("%H:%M"))
    }
}

fn parse_hour_minute(s: &str) -> Option<NaiveTime> {
    let (h, m) = s.split_once(':')?;
    NaiveTime::from_hms_opt(h.parse().ok()?, m.parse().ok()?, 0)
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct EntryFields {
    course_name: String,
    #[serde(default)]
    professor: String,
    #[serde(default)]
    location: String,
    time: String,
    user_id: user::Sub,
    #[serde(default)]
    is_online: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct TimetableEntry {
    pub id: Id,
    pub course_name: String,
    pub professor: String,
    pub location: String,
    pub time: String,
    pub user_id: user::Sub,
    pub is_online: bool,
}

impl TimetableEntry {
    pub fn slot(&self) -> Option<Slot> {
        Slot::parse(&self.time)
    }
}

impl TryFrom<&Document> for TimetableEntry {
    type Error = super::Error;

    fn try_from(doc: &Document) -> super::Result<Self> {
        let id = Id::from(doc.id());
        let f = doc
            .decode::<EntryFields>()
            .map_err(|e| super::Error::Malformed(id.clone(), e.to_string()))?;

        Ok(Self {
            id,
            course_name: f.course_name,
            professor: f.professor,
            location: f.location,
            time: f.time,
            user_id: f.user_id,
            is_online: f.is_online,
        })
    }
}

/// Classes to show for one weekday.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct DaySchedule {
    pub day: Weekday,
    /// Offline classes held on `day`, earliest first.
    pub today: Vec<TimetableEntry>,
    /// Every online class, in input order.
    pub online: Vec<TimetableEntry>,
}

impl DaySchedule {
    pub fn for_day(entries: &[TimetableEntry], day: Weekday) -> Self {
        let mut today = entries
            .iter()
            .filter(|e| !e.is_online)
            .filter_map(|e| e.slot().filter(|s| s.day == day).map(|s| (s.start, e.clone())))
            .collect::<Vec<_>>();
        today.sort_by_key(|(start, _)| *start);

        let online = entries.iter().filter(|e| e.is_online).cloned().collect();

        Self {
            day,
            today: today.into_iter().map(|(_, e)| e).collect(),
            online,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn time(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn entry(id: &str, time: &str, is_online: bool) -> TimetableEntry {
        TimetableEntry {
            id: Id::from(id),
            course_name: format!("course {id}"),
            professor: String::new(),
            location: "본관 301".into(),
            time: time.into(),
            user_id: "u1".into(),
            is_online,
        }
    }

    #[test]
    fn should_parse_slot() {
        let slot = Slot::parse("월 10:00-12:00").unwrap();
        assert_eq!(slot.day, Weekday::Mon);
        assert_eq!(slot.start, time(10, 0));
        assert_eq!(slot.end, time(12, 0));
        assert_eq!(slot.time_range(), "10:00-12:00");
    }

    #[test]
    fn should_parse_slot_with_spaced_range_and_short_hour() {
        let slot = Slot::parse("화 9:30 - 10:45").unwrap();
        assert_eq!(slot.day, Weekday::Tue);
        assert_eq!(slot.start, time(9, 30));
        assert_eq!(slot.end, time(10, 45));
    }

    #[test]
    fn should_not_parse_invalid_slots() {
        assert_eq!(Slot::parse(ONLINE_SLOT), None);
        assert_eq!(Slot::parse("월"), None);
        assert_eq!(Slot::parse("월 10:00"), None);
        assert_eq!(Slot::parse("Mon 10:00-12:00"), None);
        assert_eq!(Slot::parse("월 10:xx-12:00"), None);
        assert_eq!(Slot::parse("월 25:00-26:00"), None);
    }

    #[test]
    fn should_map_korean_days() {
        assert_eq!(korean_day(Weekday::Wed), "수");
        assert_eq!(parse_korean_day("일"), Some(Weekday::Sun));
        assert_eq!(parse_korean_day("x"), None);
    }

    #[test]
    fn should_split_day_schedule() {
        let entries = vec![
            entry("net", "월 14:00-16:00", false),
            entry("writing", ONLINE_SLOT, true),
            entry("os", "월 10:00-12:00", false),
            entry("db", "화 10:00-12:00", false),
            entry("broken", "월 ??", false),
            entry("english", ONLINE_SLOT, true),
        ];

        let schedule = DaySchedule::for_day(&entries, Weekday::Mon);

        let today = schedule.today.iter().map(|e| e.id.to_string()).collect::<Vec<_>>();
        assert_eq!(today, vec!["os", "net"]);

        let online = schedule.online.iter().map(|e| e.id.to_string()).collect::<Vec<_>>();
        assert_eq!(online, vec!["writing", "english"]);
    }
}
