//! Weekly usage figures and billing history.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageDay {
    pub name: String,
    pub consumption: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum InvoiceStatus {
    Paid,
    Unpaid,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Invoice {
    pub number: String,
    pub month: String,
    pub amount_cents: u64,
    pub status: InvoiceStatus,
}

impl Invoice {
    pub fn amount_display(&self) -> String {
        format!("${}.{:02}", self.amount_cents / 100, self.amount_cents % 100)
    }
}

#[derive(Debug, Clone)]
pub struct UsageReport {
    pub days: Vec<UsageDay>,
    pub invoices: Vec<Invoice>,
    /// Week-over-week change in percent
    pub change_vs_last_week: i32,
}

impl Default for UsageReport {
    fn default() -> Self {
        let days = [
            ("M", 15.0),
            ("T", 18.0),
            ("W", 22.0),
            ("T", 20.0),
            ("F", 25.0),
            ("S", 30.0),
            ("S", 28.0),
        ]
        .into_iter()
        .map(|(name, consumption)| UsageDay {
            name: name.to_string(),
            consumption,
        })
        .collect();

        let invoices = [
            ("October", 12450, InvoiceStatus::Unpaid),
            ("September", 11220, InvoiceStatus::Paid),
            ("August", 14500, InvoiceStatus::Paid),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, (month, amount_cents, status))| Invoice {
            number: format!("#00{}", 8932 + i),
            month: month.to_string(),
            amount_cents,
            status,
        })
        .collect();

        Self {
            days,
            invoices,
            change_vs_last_week: -12,
        }
    }
}

impl UsageReport {
    pub fn weekly_total_kwh(&self) -> f64 {
        self.days.iter().map(|d| d.consumption).sum()
    }

    pub fn peak_day(&self) -> Option<&UsageDay> {
        self.days
            .iter()
            .max_by(|a, b| a.consumption.total_cmp(&b.consumption))
    }

    pub fn outstanding(&self) -> impl Iterator<Item = &Invoice> {
        self.invoices
            .iter()
            .filter(|i| i.status == InvoiceStatus::Unpaid)
    }

    /// Prompt handed to the analysis model
    pub fn analysis_prompt(&self) -> crate::Result<String> {
        let data = serde_json::to_string(&self.days)?;
        Ok(format!(
            "Review this energy data: {}. Brief 2 sentence summary.",
            data
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weekly_total_and_peak() {
        let report = UsageReport::default();

        assert_eq!(report.weekly_total_kwh(), 158.0);
        assert_eq!(report.peak_day().unwrap().consumption, 30.0);
    }

    #[test]
    fn test_invoice_numbers_and_amounts() {
        let report = UsageReport::default();

        assert_eq!(report.invoices[0].number, "#008932");
        assert_eq!(report.invoices[2].number, "#008934");
        assert_eq!(report.invoices[0].amount_display(), "$124.50");
        assert_eq!(report.outstanding().count(), 1);
    }

    #[test]
    fn test_analysis_prompt_embeds_data() {
        let prompt = UsageReport::default().analysis_prompt().unwrap();

        assert!(prompt.starts_with("Review this energy data: [{\"name\":\"M\""));
        assert!(prompt.ends_with("Brief 2 sentence summary."));
    }
}
