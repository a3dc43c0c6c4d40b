use crate::tool::ToolDefinition;

const PREAMBLE: &str = "\
In this environment you have access to a set of tools you can use to answer the user's question.

You may call them like this:
<function_calls>
<invoke>
<tool_name>$TOOL_NAME</tool_name>
<parameters>
<$PARAMETER_NAME>$PARAMETER_VALUE</$PARAMETER_NAME>
...
</parameters>
</invoke>
</function_calls>

Here are the tools available:
";

/// Renders the instruction block that teaches a model the invocation markup
/// and lists the available tools. Meant to be appended to the system prompt
/// of a request whose stop sequences include [super::STOP_SEQUENCE].
pub fn system_prompt(tools: &[ToolDefinition]) -> String {
    let descriptions: Vec<String> = tools.iter().map(describe).collect();
    format!("{PREAMBLE}{}", descriptions.join("\n"))
}

fn describe(tool: &ToolDefinition) -> String {
    let mut lines = vec![
        "<tool_description>".to_string(),
        format!("<tool_name>{}</tool_name>", tool.name),
    ];
    if let Some(description) = &tool.description {
        lines.push(format!("<description>{description}</description>"));
    }

    lines.push("<parameters>".to_string());
    for (name, ty) in tool.parameters() {
        lines.push("<parameter>".to_string());
        lines.push(format!("<name>{name}</name>"));
        lines.push(format!("<type>{}</type>", ty.as_str()));
        lines.push("</parameter>".to_string());
    }
    lines.push("</parameters>".to_string());
    lines.push("</tool_description>".to_string());

    lines.join("\n")
}
