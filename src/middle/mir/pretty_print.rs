use colored::Colorize;
use itertools::Itertools;

use crate::middle::mir;

/// Prints the compilation unit to stdout with terminal colors.
pub fn pretty_print_mir(unit: &mir::CompilationUnit) {
    print!("{}", colorize_mir(unit));
}

pub fn colorize_mir(unit: &mir::CompilationUnit) -> String {
    let mut output = String::new();

    for global in &unit.global_variables {
        output.push_str(&format!(
            "{} {} {} {}{}\n",
            "const".magenta(),
            global.name.blue(),
            "=".white(),
            escape_string(&global.content).green(),
            ";".white()
        ));
    }

    if !unit.global_variables.is_empty() {
        output.push('\n');
    }

    for function in &unit.functions {
        output.push_str(&format!(
            "{} {} {}\n",
            "function".magenta(),
            function.name.blue(),
            "{".white()
        ));

        for (index, parameter) in function.parameters.iter().enumerate() {
            output.push_str(&format!(
                "  {} {parameter} {} {}{}\n",
                "let".magenta(),
                "=".white(),
                format!("_ARG{index}").purple(),
                ";".white()
            ));
        }

        if !function.parameters.is_empty() {
            output.push('\n');
        }

        for statement in &function.body {
            match statement {
                mir::Statement::Label(label) => {
                    output.push_str(&format!("  {}\n", format!("{label}:").bright_red()))
                }
                mir::Statement::Jump(label) => output.push_str(&format!(
                    "  {} {}{}\n",
                    "goto".cyan(),
                    label.bright_red(),
                    ";".white()
                )),
                mir::Statement::ConditionalJumpFallThrough { condition, label } => output
                    .push_str(&format!(
                        "  {} ({condition}) {} {}{}\n",
                        "if".cyan(),
                        "goto".cyan(),
                        label.bright_red(),
                        ";".white()
                    )),
                mir::Statement::Return(_) => {
                    output.push_str(&format!("  {}\n", statement.to_string().yellow()))
                }
                _ => output.push_str(&format!("  {statement}\n")),
            }
        }

        output.push_str(&format!("{}\n\n", "}".white()));
    }

    output
}

pub fn escape_string(content: &str) -> String {
    let mut escaped = String::from("\"");

    for character in content.chars() {
        match character {
            '"' => escaped.push_str("\\\""),
            '\\' => escaped.push_str("\\\\"),
            '\n' => escaped.push_str("\\n"),
            '\t' => escaped.push_str("\\t"),
            other => escaped.push(other),
        }
    }

    escaped.push('"');
    escaped
}

impl core::fmt::Display for mir::Expression {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            mir::Expression::Constant(value) => write!(f, "{value}"),
            mir::Expression::Name(name) => f.write_str(name),
            mir::Expression::Temporary(name) => f.write_str(name),
            mir::Expression::Memory(address) => write!(f, "MEM[{address}]"),
            mir::Expression::Binary {
                operator,
                left,
                right,
            } => write!(f, "({left} {operator} {right})"),
        }
    }
}

impl core::fmt::Display for mir::Statement {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            mir::Statement::MoveTemporary {
                destination,
                source,
            } => write!(f, "{destination} = {source};"),
            mir::Statement::MoveMemory { address, source } => {
                write!(f, "MEM[{address}] = {source};")
            }
            mir::Statement::Jump(label) => write!(f, "goto {label};"),
            mir::Statement::Label(label) => write!(f, "{label}:"),
            mir::Statement::Call {
                callee,
                arguments,
                collector,
            } => {
                if let Some(collector) = collector {
                    write!(f, "{collector} = ")?;
                }
                write!(f, "{callee}({});", arguments.iter().join(", "))
            }
            mir::Statement::Return(None) => f.write_str("return;"),
            mir::Statement::Return(Some(value)) => write!(f, "return {value};"),
            mir::Statement::ConditionalJumpFallThrough { condition, label } => {
                write!(f, "if ({condition}) goto {label};")
            }
        }
    }
}

impl core::fmt::Display for mir::Function {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "function {} {{", self.name)?;

        for (index, parameter) in self.parameters.iter().enumerate() {
            writeln!(f, "  let {parameter} = _ARG{index};")?;
        }

        if !self.parameters.is_empty() {
            writeln!(f)?;
        }

        for statement in &self.body {
            writeln!(f, "  {statement}")?;
        }

        writeln!(f, "}}")
    }
}

impl core::fmt::Display for mir::CompilationUnit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for global in &self.global_variables {
            writeln!(f, "const {} = {};", global.name, escape_string(&global.content))?;
        }

        if !self.global_variables.is_empty() {
            writeln!(f)?;
        }

        write!(f, "{}", self.functions.iter().join("\n"))
    }
}
