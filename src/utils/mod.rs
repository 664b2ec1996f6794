//! Utility functions and helpers for esdump
//!
//! - String manipulation for log output
//! - Duration parsing and formatting

/// String utilities
pub mod string {
    /// Truncate string to maximum length
    ///
    /// # Arguments
    /// * `s` - String to truncate
    /// * `max_len` - Maximum length in characters
    ///
    /// # Returns
    /// * `String` - Truncated string with ellipsis if needed
    pub fn truncate(s: &str, max_len: usize) -> String {
        if s.chars().count() <= max_len {
            s.to_string()
        } else {
            let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
            format!("{}...", kept)
        }
    }
}

/// Time and duration utilities
pub mod time {
    use std::time::Duration;

    /// Format duration as human-readable string
    ///
    /// # Arguments
    /// * `duration` - Duration to format
    ///
    /// # Returns
    /// * `String` - Formatted duration (e.g., "1h 30m 45s")
    pub fn format_duration(duration: Duration) -> String {
        let secs = duration.as_secs();
        let millis = duration.subsec_millis();

        if secs == 0 {
            return format!("{}ms", millis);
        }

        let hours = secs / 3600;
        let minutes = (secs % 3600) / 60;
        let seconds = secs % 60;

        let mut parts = Vec::new();

        if hours > 0 {
            parts.push(format!("{}h", hours));
        }
        if minutes > 0 {
            parts.push(format!("{}m", minutes));
        }
        if seconds > 0 || parts.is_empty() {
            parts.push(format!("{}s", seconds));
        }

        parts.join(" ")
    }

    /// Parse duration string (e.g., "500ms", "30s", "5m", "1h", "1d")
    ///
    /// # Arguments
    /// * `s` - Duration string
    ///
    /// # Returns
    /// * `Option<Duration>` - Parsed duration or None
    pub fn parse_duration(s: &str) -> Option<Duration> {
        let s = s.trim();
        let split = s.find(|c: char| !c.is_ascii_digit())?;
        let (num_str, unit) = s.split_at(split);
        let num: u64 = num_str.parse().ok()?;

        match unit {
            "ms" => Some(Duration::from_millis(num)),
            "s" => Some(Duration::from_secs(num)),
            "m" => Some(Duration::from_secs(num.checked_mul(60)?)),
            "h" => Some(Duration::from_secs(num.checked_mul(3600)?)),
            "d" => Some(Duration::from_secs(num.checked_mul(86_400)?)),
            _ => None,
        }
    }

    /// Render a duration as a search-service time value (whole milliseconds).
    ///
    /// # Examples
    /// ```
    /// use std::time::Duration;
    /// use esdump::utils::time::keep_alive_param;
    ///
    /// assert_eq!(keep_alive_param(Duration::from_secs(300)), "300000ms");
    /// ```
    pub fn keep_alive_param(duration: Duration) -> String {
        format!("{}ms", duration.as_millis())
    }
}
