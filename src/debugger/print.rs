//! Debug output of the game: printf-style logging and the debug_Print opcodes.

use crate::emulator::{Emulator, MemoryExt, StringEncoding};
use crate::layout::ScriptEngineLayout;
use crate::runtime::ScriptRuntimeRecord;
use regex::{Captures, Regex};
use std::sync::LazyLock;

/// Arguments read from registers after the format string register.
pub const MAX_PRINTF_ARGS: usize = 9;

static PRINTF_SPEC: LazyLock<Result<Regex, regex::Error>> = LazyLock::new(|| {
    Regex::new(r"%([-+ #0]*)(\d+)?(?:\.(\d+))?(?:hh|h|ll|l|z|j|t)?([diouxXcsp%])")
});

/// Formats a C format string, reading argument `i` through `arg(i)` and string arguments
/// through `read_str`. `%p` is printed like `%x`; specifiers past the ninth argument are
/// left as they are.
pub fn format_printf(
    format: &str,
    mut arg: impl FnMut(usize) -> u32,
    read_str: impl Fn(u32) -> String,
) -> String {
    let Ok(spec) = &*PRINTF_SPEC else {
        return format.to_string();
    };
    let mut next = 0usize;
    spec.replace_all(format, |caps: &Captures<'_>| {
        let conversion = &caps[4];
        if conversion == "%" {
            return "%".to_string();
        }
        if next >= MAX_PRINTF_ARGS {
            return caps[0].to_string();
        }
        let value = arg(next);
        next += 1;

        let flags = caps.get(1).map_or("", |m| m.as_str());
        let width: usize = caps.get(2).and_then(|m| m.as_str().parse().ok()).unwrap_or(0);
        let precision: Option<usize> = caps.get(3).and_then(|m| m.as_str().parse().ok());

        let body = match conversion {
            "d" | "i" => (value as i32).to_string(),
            "u" => value.to_string(),
            "x" | "p" => format!("{:x}", value),
            "X" => format!("{:X}", value),
            "o" => format!("{:o}", value),
            "c" => char::from_u32(value & 0xff).map(String::from).unwrap_or_default(),
            "s" => {
                let s = read_str(value);
                match precision {
                    Some(max) => s.chars().take(max).collect(),
                    None => s,
                }
            }
            _ => caps[0].to_string(),
        };
        pad(body, width, flags)
    })
    .into_owned()
}

fn pad(body: String, width: usize, flags: &str) -> String {
    let len = body.chars().count();
    if len >= width {
        return body;
    }
    let fill = width - len;
    if flags.contains('-') {
        format!("{}{}", body, " ".repeat(fill))
    } else if flags.contains('0') {
        match body.strip_prefix('-') {
            Some(digits) => format!("-{}{}", "0".repeat(fill), digits),
            None => format!("{}{}", "0".repeat(fill), body),
        }
    } else {
        format!("{}{}", " ".repeat(fill), body)
    }
}

/// Message of a debug_Print family opcode about to run, or `None` for other opcodes.
///
/// `debug_PrintFlag` and `PrintScenario` append the game variable named by their first
/// parameter.
pub fn format_script_print(
    emu: &dyn Emulator,
    layout: &ScriptEngineLayout,
    runtime: &ScriptRuntimeRecord,
    string_ptr: u32,
) -> anyhow::Result<Option<String>> {
    let opcode_id = emu.read_u16(runtime.current_opcode_addr)?;
    let Some(opcode) = layout.opcode_name(opcode_id) else {
        return Ok(None);
    };
    match opcode {
        "debug_Print" => Ok(Some(emu.read_string(string_ptr, StringEncoding::Latin1)?)),
        "debug_PrintFlag" | "PrintScenario" => {
            let text = emu.read_string(string_ptr, StringEncoding::Latin1)?;
            let var_id = emu.read_u16(runtime.current_opcode_addr.wrapping_add(2))?;
            let value = emu.read_game_variable(var_id, 0)?;
            let name = layout
                .game_variable_name(var_id)
                .map(str::to_string)
                .unwrap_or_else(|| format!("VAR_{}", var_id));
            Ok(Some(format!("{} \u{2014} {}={}", text, name, value)))
        }
        _ => Ok(None),
    }
}
