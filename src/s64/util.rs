use super::{HEADER_SIZE, SLOT_SIZE};
use std::time::{self, SystemTime};

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

pub fn slot_offset(index: usize) -> u64 {
    HEADER_SIZE + index as u64 * SLOT_SIZE
}

/// Packs a Unix timestamp (UTC) into `(creation_date, creation_time)`.
///
/// date: `year << 16 | month << 8 | day`
/// time: `hour << 24 | minute << 16 | second << 8`, low byte reserved
pub fn pack_timestamp(secs: u64) -> (u32, u32) {
    let days = (secs / 86_400) as i64;
    let rem = secs % 86_400;
    let (year, month, day) = civil_from_days(days);

    let date = (year as u32) << 16 | month << 8 | day;
    let time = ((rem / 3600) as u32) << 24
        | ((rem % 3600 / 60) as u32) << 16
        | ((rem % 60) as u32) << 8;
    (date, time)
}

/// Inverse of [`pack_timestamp`]. Returns `None` for fields out of range.
pub fn unpack_timestamp(date: u32, time: u32) -> Option<u64> {
    let year = (date >> 16) as i64;
    let month = (date >> 8) & 0xff;
    let day = date & 0xff;
    let hour = (time >> 24) as u64;
    let minute = ((time >> 16) & 0xff) as u64;
    let second = ((time >> 8) & 0xff) as u64;

    if year < 1970 || !(1..=12).contains(&month) || !(1..=31).contains(&day) {
        return None;
    }
    if hour > 23 || minute > 59 || second > 59 {
        return None;
    }

    let days = days_from_civil(year, month, day);
    Some(days as u64 * 86_400 + hour * 3600 + minute * 60 + second)
}

// Howard Hinnant's days <-> civil date algorithms, proleptic Gregorian.
fn civil_from_days(days: i64) -> (i64, u32, u32) {
    let z = days + 719_468;
    let era = z.div_euclid(146_097);
    let doe = z.rem_euclid(146_097);
    let yoe = (doe - doe / 1460 + doe / 36_524 - doe / 146_096) / 365;
    let doy = doe - (365 * yoe + yoe / 4 - yoe / 100);
    let mp = (5 * doy + 2) / 153;
    let day = (doy - (153 * mp + 2) / 5 + 1) as u32;
    let month = (if mp < 10 { mp + 3 } else { mp - 9 }) as u32;
    let year = yoe + era * 400 + if month <= 2 { 1 } else { 0 };
    (year, month, day)
}

fn days_from_civil(year: i64, month: u32, day: u32) -> i64 {
    let year = if month <= 2 { year - 1 } else { year };
    let era = year.div_euclid(400);
    let yoe = year.rem_euclid(400);
    let month = month as i64;
    let mp = if month > 2 { month - 3 } else { month + 9 };
    let doy = (153 * mp + 2) / 5 + day as i64 - 1;
    let doe = yoe * 365 + yoe / 4 - yoe / 100 + doy;
    era * 146_097 + doe - 719_468
}

/// Copies `s` into a NUL-padded fixed field. The caller checks that `s`
/// leaves room for the terminator.
pub fn to_fixed<const N: usize>(s: &str) -> [u8; N] {
    let mut buf = [0u8; N];
    let len = s.len().min(N - 1);
    buf[..len].copy_from_slice(&s.as_bytes()[..len]);
    buf
}

/// Content bytes of a NUL-terminated fixed field.
pub fn from_fixed(buf: &[u8]) -> String {
    let end = buf.iter().position(|&b| b == 0).unwrap_or(buf.len());
    String::from_utf8_lossy(&buf[..end]).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_offsets() {
        assert_eq!(slot_offset(0), 32);
        assert_eq!(slot_offset(1), 32 + 1024);
        assert_eq!(slot_offset(63), 32 + 63 * 1024);
    }

    #[test]
    fn pack_epoch() {
        assert_eq!(pack_timestamp(0), (1970 << 16 | 1 << 8 | 1, 0));
    }

    #[test]
    fn pack_known_timestamp() {
        // 2024-02-29T13:45:07Z
        let (date, time) = pack_timestamp(1_709_214_307);
        assert_eq!(date, 2024 << 16 | 2 << 8 | 29);
        assert_eq!(time, 13 << 24 | 45 << 16 | 7 << 8);
        assert_eq!(unpack_timestamp(date, time), Some(1_709_214_307));
    }

    #[test]
    fn unpack_rejects_garbage() {
        assert_eq!(unpack_timestamp(0, 0), None);
        assert_eq!(unpack_timestamp(2024 << 16 | 13 << 8 | 1, 0), None);
        assert_eq!(unpack_timestamp(2024 << 16 | 1 << 8 | 1, 24 << 24), None);
    }

    #[test]
    fn fixed_fields() {
        let buf: [u8; 8] = to_fixed("bob");
        assert_eq!(&buf, b"bob\0\0\0\0\0");
        assert_eq!(from_fixed(&buf), "bob");

        let buf: [u8; 4] = to_fixed("toolong");
        assert_eq!(&buf, b"too\0");
        assert_eq!(from_fixed(&buf), "too");
    }
}
