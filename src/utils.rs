use std::ops::Range;

/// Parse `"a..b"` into `a..b`, for command-line arguments
pub fn parse_range<T: std::str::FromStr>(s: &str) -> Result<Range<T>, String>
where
    <T as std::str::FromStr>::Err: std::fmt::Display,
{
    let Some((x, y)) = s.split_once("..") else {
        return Err(format!("could not find '..' in range `{s}`"));
    };
    let parse = |v: &str| v.trim().parse::<T>().map_err(|e| format!("`{v}` in range `{s}`: {e}"));
    Ok(parse(x)?..parse(y)?)
}

/// `range.start`, `range.start + step`, ... up to, but excluding, `range.end`
pub fn steps(range: &Range<f64>, step: f64) -> Vec<f64> {
    if !(step > 0.0) { return vec![] }
    let n = ((range.end - range.start) / step).ceil().max(0.0) as usize;
    (0..n).map(|i| range.start + i as f64 * step).collect()
}

/// Group numeric digits to facilitate reading long numbers
pub fn group_digits<F: std::fmt::Display>(n: F) -> String {
    use numsep::{separate, Locale};
    separate(n, Locale::English)
}


pub mod timing {

    use super::group_digits;
    use std::time::Instant;
    use std::io::Write;

    pub struct Progress {
        previous: Instant,
    }

    impl Progress {

        #[allow(clippy::new_without_default)]
        pub fn new() -> Self { Self { previous: Instant::now() } }

        /// Print message, append ellipsis, flush stdout, stay on same line, start timer.
        pub fn start(&mut self, message: &str) {
            print!("{message} ... ");
            let _ = std::io::stdout().flush();
            self.start_timer();
        }

        // Print time elapsed since last start or done
        pub fn done(&mut self) {
            println!("{} ms", group_digits(self.previous.elapsed().as_millis()));
            self.start_timer();
        }

        fn start_timer(&mut self) { self.previous = Instant::now() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn ranges() {
        assert_eq!(parse_range::<usize>("50..81"), Ok(50..81));
        assert_eq!(parse_range::<f64>(" 2.5 .. 4 "), Ok(2.5..4.0));
        assert!(parse_range::<usize>("50-81").is_err());
        assert!(parse_range::<usize>("a..3").is_err());
    }

    #[rstest(/**/ start, end, step, expected,
             case(50.0, 81.0, 5.0, vec![50.0, 55.0, 60.0, 65.0, 70.0, 75.0, 80.0]),
             case(50.0, 80.0, 5.0, vec![50.0, 55.0, 60.0, 65.0, 70.0, 75.0]),
             case(60.0, 60.0, 5.0, vec![]),
             case(60.0, 50.0, 5.0, vec![]),
             case(60.0, 70.0, 0.0, vec![]),
    )]
    fn kvp_steps(start: f64, end: f64, step: f64, expected: Vec<f64>) {
        assert_eq!(steps(&(start..end), step), expected);
    }

    #[test]
    fn digits_are_grouped() {
        assert_eq!(group_digits(1234567), "1,234,567");
    }
}
