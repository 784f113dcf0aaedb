use crate::domain::types::ToolSpec;

const POLICY: &str = "Use tools when they help answer the question; multiple tools may be used in sequence. \
When no tool applies, answer directly from what you know.";

/// Render the system instruction for a session. Pure: identical tool
/// listings produce byte-identical prompts, so the text is generated once
/// per session and is safe to compare in tests.
pub fn render(specs: &[ToolSpec]) -> String {
    let mut out = String::from(
        "You are an assistant that answers user questions, optionally by calling tools.\n",
    );

    if specs.is_empty() {
        out.push_str("\nNo tools are available in this session. Answer from what you know and say so when a request would have needed one.\n");
    } else {
        out.push_str("\nAvailable tools:\n");
        for spec in specs {
            out.push_str("- ");
            out.push_str(&spec.name);
            if !spec.description.is_empty() {
                out.push_str(": ");
                out.push_str(&spec.description);
            }
            out.push('\n');
            for param in &spec.parameters {
                out.push_str("    ");
                out.push_str(&param.name);
                out.push_str(" (");
                out.push_str(&param.kind);
                out.push(')');
                if !param.description.is_empty() {
                    out.push_str(" - ");
                    out.push_str(&param.description);
                }
                out.push('\n');
            }
        }
    }

    out.push('\n');
    out.push_str(POLICY);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::types::ToolParam;

    fn sample_specs() -> Vec<ToolSpec> {
        vec![
            ToolSpec {
                name: "say_hello".into(),
                description: "Greets a person by name.".into(),
                parameters: vec![ToolParam {
                    name: "name".into(),
                    description: "Who to greet".into(),
                    kind: "string".into(),
                }],
            },
            ToolSpec {
                name: "clock".into(),
                description: String::new(),
                parameters: Vec::new(),
            },
        ]
    }

    #[test]
    fn render_is_pure() {
        let specs = sample_specs();
        assert_eq!(render(&specs), render(&specs));
    }

    #[test]
    fn render_enumerates_tools_in_directory_order() {
        let text = render(&sample_specs());
        let hello = text.find("say_hello").expect("first tool listed");
        let clock = text.find("clock").expect("second tool listed");
        assert!(hello < clock);
        assert!(text.contains("name (string) - Who to greet"));
        assert!(text.contains("multiple tools may be used in sequence"));
    }

    #[test]
    fn render_states_absence_of_tools() {
        let text = render(&[]);
        assert!(text.contains("No tools are available"));
        assert!(text.contains("multiple tools may be used in sequence"));
    }
}
