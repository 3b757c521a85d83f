//! Monthly time axes built from MPAS interval strings, across calendars.

use cmip_common::{AxisDescriptor, Calendar, CalendarDate, TimeStamp, TimeUnits};

fn xtime(year: i32, month: u32) -> String {
    let (year, month) = if month > 12 { (year + 1, month - 12) } else { (year, month) };
    format!("{year:04}-{month:02}-01_00:00:00")
}

fn monthly_stamps(units: &TimeUnits, years: i32) -> Vec<TimeStamp> {
    let mut stamps = Vec::new();
    for year in 1..=years {
        for month in 1..=12 {
            let start = CalendarDate::parse(&xtime(year, month), units.calendar).unwrap();
            let end = CalendarDate::parse(&xtime(year, month + 1), units.calendar).unwrap();
            stamps.push(TimeStamp::midpoint([units.encode(&start).unwrap(), units.encode(&end).unwrap()]));
        }
    }
    stamps
}

#[test]
fn test_noleap_two_years_are_contiguous() {
    let units = TimeUnits::mpas_default();
    let stamps = monthly_stamps(&units, 2);

    assert_eq!(stamps.len(), 24);
    assert_eq!(stamps[0].bounds, [0.0, 31.0]);
    assert_eq!(stamps[1].bounds, [31.0, 59.0]);
    assert_eq!(stamps[23].bounds[1], 730.0);
    for pair in stamps.windows(2) {
        assert_eq!(pair[0].bounds[1], pair[1].bounds[0]);
        assert!(pair[0].value < pair[1].value);
    }

    // The resulting time axis is accepted as is
    let time = AxisDescriptor::time(units.to_string());
    assert!(time.is_time());
    assert_eq!(time.units(), "days since 0001-01-01 00:00:00");
}

#[test]
fn test_day360_months_are_equal() {
    let units = TimeUnits::parse("days since 0001-01-01", Calendar::Day360).unwrap();
    let stamps = monthly_stamps(&units, 1);
    assert!(stamps.iter().all(|s| s.bounds[1] - s.bounds[0] == 30.0));
    assert_eq!(stamps[11].bounds[1], 360.0);
}

#[test]
fn test_rebase_to_model_reference() {
    let mpas = TimeUnits::mpas_default();
    let cf = TimeUnits::parse("days since 0002-01-01 00:00:00", Calendar::NoLeap).unwrap();
    let stamps = monthly_stamps(&mpas, 2);

    assert_eq!(stamps[12].bounds[0], 365.0);
    assert_eq!(cf.rebase(stamps[12].bounds[0], &mpas).unwrap(), 0.0);
    assert_eq!(cf.rebase(stamps[12].value, &mpas).unwrap(), 15.5);
}
