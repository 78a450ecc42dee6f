use anyhow::{anyhow, bail, Context, Result};
use chrono::NaiveDate;

/// What the `visitstats` binary was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Run the scheduler loop until interrupted.
    Run,
    /// One scheduler iteration against the current time.
    RunOnce,
    Backfill {
        start: NaiveDate,
        end: NaiveDate,
        resume: bool,
    },
    /// Print the dashboard summary of a date range.
    Summary { start: NaiveDate, end: NaiveDate },
}

pub const USAGE: &str = "usage: visitstats [run-once | backfill START END [--resume] | summary START END]";

impl Command {
    /// Parse the arguments after the program name.
    pub fn parse(args: &[String]) -> Result<Self> {
        let Some(name) = args.first() else {
            return Ok(Command::Run);
        };
        match name.as_str() {
            "run" => Ok(Command::Run),
            "run-once" => Ok(Command::RunOnce),
            "backfill" => {
                let (start, end) = date_pair(&args[1..])?;
                let resume = match args.get(3).map(String::as_str) {
                    None => false,
                    Some("--resume") => true,
                    Some(other) => bail!("unexpected argument {other:?}\n{USAGE}"),
                };
                Ok(Command::Backfill { start, end, resume })
            }
            "summary" => {
                let (start, end) = date_pair(&args[1..])?;
                Ok(Command::Summary { start, end })
            }
            other => Err(anyhow!("unknown command {other:?}\n{USAGE}")),
        }
    }
}

fn date_pair(args: &[String]) -> Result<(NaiveDate, NaiveDate)> {
    let start = args.first().ok_or_else(|| anyhow!("missing START\n{USAGE}"))?;
    let end = args.get(1).ok_or_else(|| anyhow!("missing END\n{USAGE}"))?;
    Ok((parse_date(start)?, parse_date(end)?))
}

fn parse_date(raw: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .with_context(|| format!("invalid date {raw:?}, expected YYYY-MM-DD"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    fn d(y: i32, m: u32, day: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, day).expect("date")
    }

    #[test]
    fn no_arguments_runs_the_loop() {
        assert_eq!(Command::parse(&[]).expect("parse"), Command::Run);
        assert_eq!(Command::parse(&args(&["run-once"])).expect("parse"), Command::RunOnce);
    }

    #[test]
    fn backfill_with_and_without_resume() {
        assert_eq!(
            Command::parse(&args(&["backfill", "2024-01-01", "2024-01-31"])).expect("parse"),
            Command::Backfill {
                start: d(2024, 1, 1),
                end: d(2024, 1, 31),
                resume: false,
            }
        );
        assert_eq!(
            Command::parse(&args(&["backfill", "2024-01-01", "2024-01-31", "--resume"]))
                .expect("parse"),
            Command::Backfill {
                start: d(2024, 1, 1),
                end: d(2024, 1, 31),
                resume: true,
            }
        );
    }

    #[test]
    fn bad_input_is_rejected() {
        assert!(Command::parse(&args(&["backfill", "2024-01-01"])).is_err());
        assert!(Command::parse(&args(&["backfill", "01/01/2024", "2024-01-02"])).is_err());
        assert!(Command::parse(&args(&["backfill", "2024-01-01", "2024-01-02", "--force"])).is_err());
        assert!(Command::parse(&args(&["serve"])).is_err());
    }
}
