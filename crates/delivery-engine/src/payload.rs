use chrono::{DateTime, Utc};
use fx_core::{Direction, Factors, NotificationLevel, Pair, ReceiptSubject, Timeframe};

/// Fixed-schema notification payload: direction label, pair, timeframe,
/// entry/SL/TP, confidence, factor breakdown, model version. Formatted once
/// per eligible recipient and handed to every configured transport.
#[derive(Debug, Clone)]
pub struct DeliveryPayload {
    pub subject: ReceiptSubject,
    pub pair: Pair,
    pub timeframe: Timeframe,
    pub direction: Direction,
    pub confidence: f64,
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub factors: Factors,
    pub model_version: String,
    pub level: NotificationLevel,
    pub generated_at: DateTime<Utc>,
}

impl DeliveryPayload {
    pub fn title(&self) -> String {
        format!(
            "{} {} ({})",
            direction_label(self.direction),
            self.pair,
            timeframe_label(self.timeframe)
        )
    }

    pub fn plain_text(&self) -> String {
        let mut factor_lines = Vec::new();
        if let Some(v) = self.factors.technical {
            factor_lines.push(format!("technical {v:.2}"));
        }
        if let Some(v) = self.factors.sentiment {
            factor_lines.push(format!("sentiment {v:.2}"));
        }
        if let Some(v) = self.factors.pattern {
            factor_lines.push(format!("pattern {v:.2}"));
        }
        let factors = if factor_lines.is_empty() {
            "n/a".to_string()
        } else {
            factor_lines.join(", ")
        };

        format!(
            "{title}\nConfidence: {confidence:.0}%\nEntry: {entry:.5}  SL: {sl:.5}  TP: {tp:.5}\nFactors: {factors}\nModel: {model}",
            title = self.title(),
            confidence = self.confidence * 100.0,
            entry = self.entry,
            sl = self.stop_loss,
            tp = self.take_profit,
            model = self.model_version,
        )
    }

    pub fn html(&self) -> String {
        format!(
            r#"<!DOCTYPE html>
<html><body style="font-family:-apple-system,BlinkMacSystemFont,'Segoe UI',Roboto,sans-serif;background:#f1f5f9;padding:24px;">
<table width="480" cellpadding="0" cellspacing="0" style="background:#fff;border-radius:8px;overflow:hidden;box-shadow:0 1px 3px rgba(0,0,0,0.1);margin:0 auto;">
  <tr><td style="background:{color};color:#fff;padding:12px 20px;font-size:16px;font-weight:700;">{title}</td></tr>
  <tr><td style="padding:16px 20px;">
    <table width="100%">
      <tr><td style="color:#94a3b8;padding:4px 0;">Confidence</td><td style="font-weight:600;">{confidence:.0}%</td></tr>
      <tr><td style="color:#94a3b8;padding:4px 0;">Entry</td><td style="font-weight:600;">{entry:.5}</td></tr>
      <tr><td style="color:#94a3b8;padding:4px 0;">Stop Loss</td><td style="font-weight:600;">{sl:.5}</td></tr>
      <tr><td style="color:#94a3b8;padding:4px 0;">Take Profit</td><td style="font-weight:600;">{tp:.5}</td></tr>
      <tr><td style="color:#94a3b8;padding:4px 0;">Model</td><td style="font-weight:600;">{model}</td></tr>
    </table>
  </td></tr>
</table>
</body></html>"#,
            color = match self.direction {
                Direction::Long => "#22c55e",
                Direction::Short => "#ef4444",
                Direction::Hold => "#64748b",
            },
            title = self.title(),
            confidence = self.confidence * 100.0,
            entry = self.entry,
            sl = self.stop_loss,
            tp = self.take_profit,
            model = self.model_version,
        )
    }
}

fn direction_label(d: Direction) -> &'static str {
    match d {
        Direction::Long => "LONG",
        Direction::Short => "SHORT",
        Direction::Hold => "HOLD",
    }
}

fn timeframe_label(tf: Timeframe) -> &'static str {
    match tf {
        Timeframe::Minute1 => "1min",
        Timeframe::Minute5 => "5min",
        Timeframe::Minute15 => "15min",
        Timeframe::Minute30 => "30min",
        Timeframe::Hour1 => "1h",
        Timeframe::Hour4 => "4h",
        Timeframe::Day1 => "1d",
        Timeframe::Week1 => "1w",
    }
}
