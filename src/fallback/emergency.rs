//! Terminal emergency templates.
//!
//! When every strategy and provider has failed, the service still answers:
//! each task type has canned guidance that is safe to give without a model.
//! Template answers always succeed and carry deliberately low confidence.

use crate::types::{TaskRequest, TaskType};

/// A canned answer used when everything else failed
#[derive(Debug, Clone)]
pub struct EmergencyAnswer {
    pub text: String,
    pub confidence: f64,
}

/// Produce the template answer for a task. Never fails.
pub fn emergency_answer(request: &TaskRequest) -> EmergencyAnswer {
    let (text, confidence) = match request.task_type {
        TaskType::EmergencyRouting => (
            "Automated analysis is currently unavailable. If there is any danger to \
life, call Triple Zero (000) immediately. For storm and flood assistance, call \
the SES on 132 500. Do not enter flood water or structurally damaged buildings. \
Follow directions from emergency services on site."
                .to_string(),
            0.5,
        ),
        TaskType::SafetyCheck => (
            "Automated safety analysis is currently unavailable. Treat the site as \
unsafe until inspected in person: keep people clear of damaged structures, \
switch off electricity and gas at the mains if safe to reach, and do not use \
wet electrical appliances. If there is immediate danger, call 000. Arrange a \
licensed builder or engineer to inspect before re-entry."
                .to_string(),
            0.4,
        ),
        TaskType::DamageAssessment => (
            "Automated damage assessment is currently unavailable. As an interim \
measure: photograph all damage before moving anything, prevent further water \
ingress with tarpaulins where safe, ventilate wet rooms, and list damaged items \
room by room. Arrange a professional assessment as soon as possible and notify \
your insurer that damage has occurred."
                .to_string(),
            0.4,
        ),
        TaskType::CostEstimate => (
            "Automated cost estimation is currently unavailable. Obtain at least two \
written quotes in AUD from licensed contractors before committing to repairs. \
Keep every receipt, including emergency mitigation costs, as insurers commonly \
reimburse reasonable make-safe expenses."
                .to_string(),
            0.35,
        ),
        TaskType::InsuranceClaim => (
            "Automated claim analysis is currently unavailable. Lodge the claim with \
your insurer as early as possible, keep copies of everything you submit, and \
record dates and names for every phone call. Do not dispose of damaged items \
until the assessor has seen them or given written approval."
                .to_string(),
            0.35,
        ),
        TaskType::RecoveryPlanning => (
            "Automated recovery planning is currently unavailable. Sequence the work \
safety first: make-safe and weatherproofing, then drying and cleaning, then \
repairs, then restoration. Engage licensed trades for structural, electrical, \
and gas work, and confirm insurance scope before ordering materials."
                .to_string(),
            0.35,
        ),
        TaskType::General => (
            "Automated analysis is currently unavailable. If the situation involves \
any danger to people, call 000. Otherwise, document the situation, avoid \
irreversible actions, and retry the analysis shortly."
                .to_string(),
            0.3,
        ),
    };

    EmergencyAnswer { text, confidence }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_task_type_has_an_answer() {
        let task_types = [
            TaskType::DamageAssessment,
            TaskType::SafetyCheck,
            TaskType::CostEstimate,
            TaskType::EmergencyRouting,
            TaskType::InsuranceClaim,
            TaskType::RecoveryPlanning,
            TaskType::General,
        ];

        for task_type in task_types {
            let request = TaskRequest::new(task_type, "anything");
            let answer = emergency_answer(&request);
            assert!(!answer.text.is_empty());
            assert!((0.3..=0.5).contains(&answer.confidence));
        }
    }

    #[test]
    fn test_emergency_routing_names_emergency_numbers() {
        let request = TaskRequest::new(TaskType::EmergencyRouting, "flooding now");
        let answer = emergency_answer(&request);
        assert!(answer.text.contains("000"));
        assert!(answer.text.contains("132 500"));
    }

    #[test]
    fn test_cost_estimate_mentions_aud() {
        let request = TaskRequest::new(TaskType::CostEstimate, "repair costs");
        let answer = emergency_answer(&request);
        assert!(answer.text.contains("AUD"));
    }
}
