use serde::{Deserialize, Serialize};

use crate::types::{Provider, TaskType};

/// A discussion participant with a fixed specialty and trust score.
///
/// Trust scores weight each persona's position during synthesis; they reflect
/// how reliable the persona's specialty has historically been for recovery
/// work, not model quality.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AgentPersona {
    LeadArchitect,
    TechnicalExpert,
    SafetyInspector,
    CostAnalyst,
    ImplementationSpecialist,
    EmergencyCoordinator,
    QualityAuditor,
}

impl AgentPersona {
    /// All personas, in registry order.
    pub fn all() -> [AgentPersona; 7] {
        [
            AgentPersona::LeadArchitect,
            AgentPersona::TechnicalExpert,
            AgentPersona::SafetyInspector,
            AgentPersona::CostAnalyst,
            AgentPersona::ImplementationSpecialist,
            AgentPersona::EmergencyCoordinator,
            AgentPersona::QualityAuditor,
        ]
    }

    /// Stable registry identifier.
    pub fn id(&self) -> &'static str {
        match self {
            AgentPersona::LeadArchitect => "lead-architect-001",
            AgentPersona::TechnicalExpert => "technical-expert-001",
            AgentPersona::SafetyInspector => "safety-inspector-001",
            AgentPersona::CostAnalyst => "cost-analyst-001",
            AgentPersona::ImplementationSpecialist => "implementation-specialist-001",
            AgentPersona::EmergencyCoordinator => "emergency-coordinator-001",
            AgentPersona::QualityAuditor => "quality-auditor-001",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AgentPersona::LeadArchitect => "Lead Architect",
            AgentPersona::TechnicalExpert => "Technical Expert",
            AgentPersona::SafetyInspector => "Safety Inspector",
            AgentPersona::CostAnalyst => "Cost Analyst",
            AgentPersona::ImplementationSpecialist => "Implementation Specialist",
            AgentPersona::EmergencyCoordinator => "Emergency Coordinator",
            AgentPersona::QualityAuditor => "Quality Auditor",
        }
    }

    /// Weight applied to this persona's position during synthesis.
    pub fn trust_score(&self) -> f64 {
        match self {
            AgentPersona::LeadArchitect => 0.95,
            AgentPersona::TechnicalExpert => 0.93,
            AgentPersona::SafetyInspector => 0.97,
            AgentPersona::CostAnalyst => 0.91,
            AgentPersona::ImplementationSpecialist => 0.89,
            AgentPersona::EmergencyCoordinator => 0.88,
            AgentPersona::QualityAuditor => 0.98,
        }
    }

    pub fn specializations(&self) -> &'static [&'static str] {
        match self {
            AgentPersona::LeadArchitect => {
                &["system design", "coordination", "decision synthesis"]
            }
            AgentPersona::TechnicalExpert => {
                &["structural engineering", "building services", "remediation methods"]
            }
            AgentPersona::SafetyInspector => {
                &["hazard identification", "compliance", "site safety"]
            }
            AgentPersona::CostAnalyst => {
                &["cost estimation", "insurance scoping", "budget risk"]
            }
            AgentPersona::ImplementationSpecialist => {
                &["trade scheduling", "works sequencing", "contractor management"]
            }
            AgentPersona::EmergencyCoordinator => {
                &["emergency triage", "evacuation", "service dispatch"]
            }
            AgentPersona::QualityAuditor => {
                &["verification", "standards review", "defect detection"]
            }
        }
    }

    /// Provider this persona prefers for its turns.
    pub fn preferred_provider(&self) -> Provider {
        match self {
            // Coordination and triage roles value latency
            AgentPersona::LeadArchitect | AgentPersona::EmergencyCoordinator => {
                Provider::AnthropicClaude
            }
            // Deep-analysis roles value reasoning depth
            _ => Provider::OpenRouterGptOss120b,
        }
    }

    pub fn system_prompt(&self) -> String {
        let role_brief = match self {
            AgentPersona::LeadArchitect => {
                "You coordinate the group. Weigh every specialty's input, keep the \
discussion on the task, and drive toward a defensible joint answer."
            }
            AgentPersona::TechnicalExpert => {
                "You assess the technical reality: structures, services, materials, \
and what remediation methods actually work for Australian building stock."
            }
            AgentPersona::SafetyInspector => {
                "You identify hazards and compliance obligations. You veto any plan \
that puts occupants or workers at risk; safety findings outrank cost and speed."
            }
            AgentPersona::CostAnalyst => {
                "You estimate costs in AUD, flag insurance scope issues, and call out \
budget risk in the other participants' proposals."
            }
            AgentPersona::ImplementationSpecialist => {
                "You turn plans into work: trade availability, sequencing, lead times, \
and what is realistic on an Australian recovery site."
            }
            AgentPersona::EmergencyCoordinator => {
                "You handle triage and urgent response: evacuation, temporary measures, \
and coordination with emergency services (000, SES)."
            }
            AgentPersona::QualityAuditor => {
                "You verify the group's claims: check reasoning for gaps, test the \
recommendations against standards, and flag anything unsupported."
            }
        };

        format!(
            "You are the {} in a panel of disaster-recovery specialists working on \
an Australian property recovery case. Specializations: {}. {}",
            self.name(),
            self.specializations().join(", "),
            role_brief
        )
    }
}

impl std::fmt::Display for AgentPersona {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Select discussion participants for a task.
///
/// The lead architect always joins and moderates when present. Task type
/// picks the specialists; high required accuracy adds the quality auditor.
/// Capped at `max_participants`.
pub fn select_participants(
    task_type: TaskType,
    required_accuracy: f64,
    max_participants: usize,
) -> Vec<AgentPersona> {
    let mut participants = vec![AgentPersona::LeadArchitect];

    for persona in specialists_for(task_type) {
        if !participants.contains(persona) {
            participants.push(*persona);
        }
    }

    if required_accuracy >= 0.9 && !participants.contains(&AgentPersona::QualityAuditor) {
        participants.push(AgentPersona::QualityAuditor);
    }

    participants.truncate(max_participants.max(1));
    participants
}

/// Specialists for a task type, most relevant first.
fn specialists_for(task_type: TaskType) -> &'static [AgentPersona] {
    match task_type {
        TaskType::DamageAssessment => &[
            AgentPersona::TechnicalExpert,
            AgentPersona::SafetyInspector,
            AgentPersona::CostAnalyst,
        ],
        TaskType::SafetyCheck => &[AgentPersona::SafetyInspector, AgentPersona::TechnicalExpert],
        TaskType::CostEstimate => &[AgentPersona::CostAnalyst, AgentPersona::TechnicalExpert],
        TaskType::EmergencyRouting => &[
            AgentPersona::EmergencyCoordinator,
            AgentPersona::SafetyInspector,
        ],
        TaskType::InsuranceClaim => &[AgentPersona::CostAnalyst, AgentPersona::QualityAuditor],
        TaskType::RecoveryPlanning => &[
            AgentPersona::ImplementationSpecialist,
            AgentPersona::TechnicalExpert,
        ],
        TaskType::General => &[AgentPersona::TechnicalExpert],
    }
}

/// Primary analyst and consulting specialists for a sequential analysis.
///
/// The most relevant specialist leads; the rest consult. High required
/// accuracy adds the quality auditor as a consultant.
pub fn analysis_team(task_type: TaskType, required_accuracy: f64) -> (AgentPersona, Vec<AgentPersona>) {
    let specialists = specialists_for(task_type);
    let primary = specialists[0];
    let mut consultants: Vec<AgentPersona> = specialists[1..].to_vec();

    if required_accuracy >= 0.9
        && primary != AgentPersona::QualityAuditor
        && !consultants.contains(&AgentPersona::QualityAuditor)
    {
        consultants.push(AgentPersona::QualityAuditor);
    }

    (primary, consultants)
}

/// Pick the moderator from a participant list.
pub fn moderator(participants: &[AgentPersona]) -> Option<AgentPersona> {
    if participants.contains(&AgentPersona::LeadArchitect) {
        Some(AgentPersona::LeadArchitect)
    } else {
        participants.first().copied()
    }
}
