//! JSON schemas for step outputs
//!
//! Handed to the provider alongside each prompt. Field names match the serde
//! representation of the insight types (camelCase).

use serde_json::{Value, json};

/// Schema provider for step executors
pub struct StepSchemas;

impl StepSchemas {
    pub fn rfp_analysis() -> Value {
        json!({
            "type": "object",
            "description": "Structured reading of a request for proposal",
            "required": ["executiveSummary", "keyRequirements"],
            "additionalProperties": false,
            "properties": {
                "executiveSummary": {
                    "type": "string",
                    "description": "Three to five sentence summary of what the client is buying and why"
                },
                "clientName": {"type": "string", "description": "Issuing organization"},
                "industry": {"type": "string", "description": "Client industry or sector"},
                "keyRequirements": {
                    "type": "array",
                    "description": "Mandatory functional and non-functional requirements",
                    "items": {"type": "string"}
                },
                "evaluationCriteria": {
                    "type": "array",
                    "description": "How responses will be scored",
                    "items": {"type": "string"}
                },
                "deadlines": {
                    "type": "array",
                    "description": "Submission and project milestones with dates",
                    "items": {"type": "string"}
                }
            }
        })
    }

    pub fn challenges() -> Value {
        json!({
            "type": "object",
            "required": ["challenges"],
            "additionalProperties": false,
            "properties": {
                "challenges": {
                    "type": "array",
                    "description": "Business problems the client needs solved",
                    "items": {
                        "type": "object",
                        "required": ["title", "description"],
                        "additionalProperties": false,
                        "properties": {
                            "title": {"type": "string", "description": "Short name of the challenge"},
                            "description": {"type": "string", "description": "What hurts today and for whom"},
                            "impact": {"type": "string", "enum": ["high", "medium", "low"]}
                        }
                    }
                }
            }
        })
    }

    pub fn value_propositions() -> Value {
        json!({
            "type": "object",
            "required": ["valuePropositions"],
            "additionalProperties": false,
            "properties": {
                "valuePropositions": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["challenge", "proposition"],
                        "additionalProperties": false,
                        "properties": {
                            "challenge": {"type": "string", "description": "Title of the challenge addressed"},
                            "proposition": {"type": "string", "description": "How we solve it"},
                            "benefits": {
                                "type": "array",
                                "description": "Measurable outcomes for the client",
                                "items": {"type": "string"}
                            }
                        }
                    }
                }
            }
        })
    }

    pub fn discovery_questions() -> Value {
        json!({
            "type": "object",
            "required": ["categories"],
            "additionalProperties": false,
            "properties": {
                "categories": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["category", "questions"],
                        "additionalProperties": false,
                        "properties": {
                            "category": {"type": "string", "description": "e.g. Budget, Timeline, Stakeholders"},
                            "questions": {"type": "array", "items": {"type": "string"}}
                        }
                    }
                }
            }
        })
    }

    pub fn case_study_matches() -> Value {
        json!({
            "type": "object",
            "required": ["matches"],
            "additionalProperties": false,
            "properties": {
                "matches": {
                    "type": "array",
                    "description": "Catalog entries relevant to this RFP, best first",
                    "items": {
                        "type": "object",
                        "required": ["caseStudyId", "relevance"],
                        "additionalProperties": false,
                        "properties": {
                            "caseStudyId": {"type": "string", "description": "Id exactly as listed in the catalog"},
                            "relevance": {"type": "number", "minimum": 0, "maximum": 1},
                            "rationale": {"type": "string"}
                        }
                    }
                }
            }
        })
    }

    pub fn proposal_draft() -> Value {
        json!({
            "type": "object",
            "required": ["title", "sections"],
            "additionalProperties": false,
            "properties": {
                "title": {"type": "string"},
                "sections": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "required": ["heading", "body"],
                        "additionalProperties": false,
                        "properties": {
                            "heading": {"type": "string"},
                            "body": {"type": "string", "description": "Markdown body of the section"}
                        }
                    }
                }
            }
        })
    }
}
