//! Session behaviour anomalies and automation likelihood

use super::{user_agent_matches, BehavioralRisk};
use crate::collaborators::{BehaviorStore, SessionActivity, SessionBaseline};
use crate::types::AssessmentRequest;
use crate::Result;
use std::sync::Arc;

const AUTOMATION_MARKERS: &[&str] = &[
    "headless",
    "phantomjs",
    "selenium",
    "puppeteer",
    "playwright",
    "python-requests",
    "curl/",
    "wget/",
    "bot",
    "crawler",
    "spider",
];

pub struct BehavioralAnalyzer {
    store: Arc<dyn BehaviorStore>,
    automation_markers: Vec<String>,
}

impl BehavioralAnalyzer {
    pub fn new(store: Arc<dyn BehaviorStore>) -> Self {
        Self {
            store,
            automation_markers: AUTOMATION_MARKERS.iter().map(|m| m.to_string()).collect(),
        }
    }

    pub async fn analyze(&self, request: &AssessmentRequest) -> Result<BehavioralRisk> {
        let user_id = request.identity_key();
        let activity = self
            .store
            .session_activity(user_id, request.device.device_id.as_deref())
            .await?;
        let baseline = self.store.session_baseline(user_id).await?;

        let mut score = 0.0;
        let mut anomalies = Vec::new();
        let mut flag = |name: &str, points: f64| {
            score += points;
            anomalies.push(name.to_string());
        };

        if let Some(baseline) = &baseline {
            if !baseline.usual_hours.is_empty() && !baseline.usual_hours.contains(&request.hour()) {
                flag("UNUSUAL_HOUR", 15.0);
            }
        }

        if let Some(activity) = &activity {
            if let Some(baseline) = &baseline {
                for (name, points) in deviations(activity, baseline) {
                    flag(name, points);
                }
            }
            if activity.paste_events >= 3 {
                flag("PASTE_HEAVY_INPUT", 15.0);
            }
            if activity.failed_logins >= 3 {
                flag("FAILED_LOGINS", 20.0);
            }
        }

        let bot_probability = self.bot_probability(request, activity.as_ref());

        Ok(BehavioralRisk {
            score: score.clamp(0.0, 100.0),
            bot_probability,
            anomalies,
        })
    }

    fn bot_probability(
        &self,
        request: &AssessmentRequest,
        activity: Option<&SessionActivity>,
    ) -> f64 {
        let mut probability: f64 = 0.0;

        if user_agent_matches(request.device.user_agent.as_deref(), &self.automation_markers) {
            probability = probability.max(0.9);
        }

        if let Some(activity) = activity {
            // Navigating quickly without ever touching a pointer
            if activity.pointer_events == 0 && activity.pages_per_minute > 20.0 {
                probability = probability.max(0.7);
            }
            // Machine-regular keystrokes
            let cadence = (activity.typing_interval_ms, activity.typing_interval_stddev_ms);
            if let (Some(_), Some(stddev)) = cadence {
                if stddev < 5.0 {
                    probability = probability.max(0.6);
                }
            }
        }

        probability.clamp(0.0, 1.0)
    }
}

// Deviations of the current session from the user's baseline
fn deviations(activity: &SessionActivity, baseline: &SessionBaseline) -> Vec<(&'static str, f64)> {
    let mut found = Vec::new();

    if let Some(typing) = activity.typing_interval_ms {
        if baseline.avg_typing_interval_ms > 0.0 {
            let drift =
                (typing - baseline.avg_typing_interval_ms).abs() / baseline.avg_typing_interval_ms;
            if drift > 0.5 {
                found.push(("TYPING_CADENCE", 20.0));
            }
        }
    }
    if baseline.avg_session_duration_secs > 0.0
        && activity.session_duration_secs < baseline.avg_session_duration_secs * 0.25
    {
        found.push(("RUSHED_SESSION", 15.0));
    }
    if baseline.avg_pages_per_minute > 0.0
        && activity.pages_per_minute > baseline.avg_pages_per_minute * 3.0
    {
        found.push(("FAST_NAVIGATION", 15.0));
    }

    found
}
