//! System instruction and tool declarations.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::gemini::{FunctionDeclaration, Tool};

/// Name of the tool the model calls to remember something.
pub const SAVE_FACT_TOOL: &str = "save_fact";

const SOLVER_GUIDANCE: &str = "When the user asks a problem-solving question or uploads a \
problem image, switch to solver mode: give a step-by-step solution with clear conceptual \
explanations, prioritizing accuracy and clarity.";

/// How much detail a worked solution gets.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }

    fn guidance(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Be very brief, focus on the final answer and the main formula.",
            Difficulty::Medium => "Provide a clear step-by-step solution with moderate detail.",
            Difficulty::Hard => {
                "Provide a very detailed, deep-dive explanation of all concepts and steps involved."
            }
        }
    }
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "easy" => Ok(Difficulty::Easy),
            "medium" => Ok(Difficulty::Medium),
            "hard" => Ok(Difficulty::Hard),
            other => Err(format!("unknown difficulty: {other} (expected easy, medium or hard)")),
        }
    }
}

/// Persona, solver guidance, known facts and difficulty, in that order.
/// The facts section is left out when there are none.
pub fn system_instruction(persona: &str, facts: &[String], difficulty: Difficulty) -> String {
    let mut out = String::with_capacity(persona.len() + 512);
    out.push_str(persona.trim());
    out.push_str("\n\n");
    out.push_str(SOLVER_GUIDANCE);

    if !facts.is_empty() {
        out.push_str("\n\nLong-term facts I know about the user:");
        for fact in facts {
            out.push_str("\n- ");
            out.push_str(fact);
        }
    }

    out.push_str("\n\nCURRENT PROBLEM DIFFICULTY: ");
    out.push_str(difficulty.as_str());
    out.push_str(". ");
    out.push_str(difficulty.guidance());
    out
}

pub fn save_fact_tool() -> Tool {
    Tool {
        function_declarations: vec![FunctionDeclaration {
            name: SAVE_FACT_TOOL.into(),
            description: "Save an important fact about the user or their progress to long-term memory."
                .into(),
            parameters: serde_json::json!({
                "type": "OBJECT",
                "properties": {
                    "fact": {
                        "type": "STRING",
                        "description": "The fact to remember."
                    }
                },
                "required": ["fact"]
            }),
        }],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn facts_are_listed_as_bullets() {
        let facts = vec!["likes rust".to_string(), "goal: top 50".to_string()];
        let prompt = system_instruction("You are Suzanne.", &facts, Difficulty::Hard);
        assert!(prompt.starts_with("You are Suzanne."));
        assert!(prompt.contains("\n- likes rust\n- goal: top 50"));
        assert!(prompt.contains("DIFFICULTY: Hard."));
    }

    #[test]
    fn facts_section_omitted_when_empty() {
        let prompt = system_instruction("persona", &[], Difficulty::default());
        assert!(!prompt.contains("Long-term facts"));
        assert!(prompt.contains("DIFFICULTY: Medium."));
    }

    #[test]
    fn difficulty_parses_case_insensitively() {
        assert_eq!("EASY".parse::<Difficulty>().unwrap(), Difficulty::Easy);
        assert_eq!("hard".parse::<Difficulty>().unwrap(), Difficulty::Hard);
        assert!("extreme".parse::<Difficulty>().is_err());
    }

    #[test]
    fn save_fact_requires_fact_argument() {
        let tool = save_fact_tool();
        let decl = &tool.function_declarations[0];
        assert_eq!(decl.name, "save_fact");
        assert_eq!(decl.parameters["required"][0], "fact");
    }
}
