//! Typed requests for the in-container `robotgo-cli` binary.
//!
//! A [`RobotCommand`] is validated first and only then rendered into a
//! [`CommandLine`]. The command line is executed as an argv vector, so text
//! arguments never pass through a shell.

use std::fmt;
use std::str::FromStr;

use crate::error::{ControllerError, ControllerResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
    Middle,
}

impl MouseButton {
    pub fn as_str(&self) -> &'static str {
        match self {
            MouseButton::Left => "left",
            MouseButton::Right => "right",
            MouseButton::Middle => "middle",
        }
    }
}

impl FromStr for MouseButton {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "left" => Ok(MouseButton::Left),
            "right" => Ok(MouseButton::Right),
            "middle" => Ok(MouseButton::Middle),
            _ => Err(ControllerError::Validation(format!(
                "Invalid mouse button '{}'. Choose from left, right, middle",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollDirection {
    Up,
    Down,
    Left,
    Right,
}

impl ScrollDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScrollDirection::Up => "up",
            ScrollDirection::Down => "down",
            ScrollDirection::Left => "left",
            ScrollDirection::Right => "right",
        }
    }
}

impl FromStr for ScrollDirection {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "up" => Ok(ScrollDirection::Up),
            "down" => Ok(ScrollDirection::Down),
            "left" => Ok(ScrollDirection::Left),
            "right" => Ok(ScrollDirection::Right),
            _ => Err(ControllerError::Validation(format!(
                "Invalid scroll direction '{}'. Choose from up, down, left, right",
                s
            ))),
        }
    }
}

/// Pressed or released, for mouse buttons and keys alike.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleState {
    Down,
    Up,
}

impl ToggleState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToggleState::Down => "down",
            ToggleState::Up => "up",
        }
    }
}

impl FromStr for ToggleState {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "down" => Ok(ToggleState::Down),
            "up" => Ok(ToggleState::Up),
            _ => Err(ControllerError::Validation(format!(
                "Invalid state '{}'. Choose from down, up",
                s
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modifier {
    Alt,
    LeftAlt,
    RightAlt,
    Ctrl,
    LeftCtrl,
    RightCtrl,
    Shift,
    LeftShift,
    RightShift,
    Cmd,
    LeftCmd,
    RightCmd,
    Command,
}

impl Modifier {
    pub const NAMES: [&'static str; 13] = [
        "alt", "lalt", "ralt", "ctrl", "lctrl", "rctrl", "shift", "lshift", "rshift", "cmd",
        "lcmd", "rcmd", "command",
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Modifier::Alt => "alt",
            Modifier::LeftAlt => "lalt",
            Modifier::RightAlt => "ralt",
            Modifier::Ctrl => "ctrl",
            Modifier::LeftCtrl => "lctrl",
            Modifier::RightCtrl => "rctrl",
            Modifier::Shift => "shift",
            Modifier::LeftShift => "lshift",
            Modifier::RightShift => "rshift",
            Modifier::Cmd => "cmd",
            Modifier::LeftCmd => "lcmd",
            Modifier::RightCmd => "rcmd",
            Modifier::Command => "command",
        }
    }
}

impl FromStr for Modifier {
    type Err = ControllerError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "alt" => Ok(Modifier::Alt),
            "lalt" => Ok(Modifier::LeftAlt),
            "ralt" => Ok(Modifier::RightAlt),
            "ctrl" => Ok(Modifier::Ctrl),
            "lctrl" => Ok(Modifier::LeftCtrl),
            "rctrl" => Ok(Modifier::RightCtrl),
            "shift" => Ok(Modifier::Shift),
            "lshift" => Ok(Modifier::LeftShift),
            "rshift" => Ok(Modifier::RightShift),
            "cmd" => Ok(Modifier::Cmd),
            "lcmd" => Ok(Modifier::LeftCmd),
            "rcmd" => Ok(Modifier::RightCmd),
            "command" => Ok(Modifier::Command),
            _ => Err(ControllerError::Validation(format!(
                "Unknown modifier '{}'. Choose from {}",
                s,
                Modifier::NAMES.join(", ")
            ))),
        }
    }
}

/// Which window `window activate` should focus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WindowTarget {
    Name(String),
    Pid(i64),
}

impl WindowTarget {
    /// Exactly one of `name` or `pid` must be given.
    pub fn from_parts(name: Option<&str>, pid: Option<i64>) -> ControllerResult<Self> {
        match (name, pid) {
            (Some(name), None) => Ok(WindowTarget::Name(name.to_string())),
            (None, Some(pid)) => Ok(WindowTarget::Pid(pid)),
            (Some(_), Some(_)) => Err(ControllerError::Validation(
                "Provide either a window name or a pid, not both".to_string(),
            )),
            (None, None) => Err(ControllerError::Validation(
                "Provide either a window name or a pid".to_string(),
            )),
        }
    }
}

/// Screen region for `screen capture`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub x: i64,
    pub y: i64,
    pub width: i64,
    pub height: i64,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            x: 0,
            y: 0,
            width: 100,
            height: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RobotCommand {
    MouseMove { x: f64, y: f64 },
    MouseClick { button: MouseButton, double: bool },
    MouseScroll { direction: ScrollDirection, steps: i64 },
    MouseToggle { button: MouseButton, state: ToggleState },
    KeyboardType { text: String },
    KeyboardTap { key: String, mods: Vec<Modifier> },
    KeyboardToggle { key: String, state: ToggleState },
    ScreenCapture { region: Region, full: bool },
    ScreenGetPixel { x: i64, y: i64 },
    ScreenSize,
    WindowActivate { target: WindowTarget },
    WindowKill { pid: i64 },
    WindowTitle,
    ClipboardRead,
    ClipboardWrite { text: String },
    ProcessList,
    ProcessKill { pid: i64 },
}

impl RobotCommand {
    /// Short name of the action, e.g. `mouse click`.
    pub fn action(&self) -> &'static str {
        match self {
            RobotCommand::MouseMove { .. } => "mouse move",
            RobotCommand::MouseClick { .. } => "mouse click",
            RobotCommand::MouseScroll { .. } => "mouse scroll",
            RobotCommand::MouseToggle { .. } => "mouse toggle",
            RobotCommand::KeyboardType { .. } => "keyboard type",
            RobotCommand::KeyboardTap { .. } => "keyboard tap",
            RobotCommand::KeyboardToggle { .. } => "keyboard toggle",
            RobotCommand::ScreenCapture { .. } => "screen capture",
            RobotCommand::ScreenGetPixel { .. } => "screen getpixel",
            RobotCommand::ScreenSize => "screen size",
            RobotCommand::WindowActivate { .. } => "window activate",
            RobotCommand::WindowKill { .. } => "window kill",
            RobotCommand::WindowTitle => "window title",
            RobotCommand::ClipboardRead => "clipboard read",
            RobotCommand::ClipboardWrite { .. } => "clipboard write",
            RobotCommand::ProcessList => "process list",
            RobotCommand::ProcessKill { .. } => "process kill",
        }
    }

    pub fn validate(&self) -> ControllerResult<()> {
        match self {
            RobotCommand::MouseMove { x, y } => {
                if !x.is_finite() || !y.is_finite() {
                    return Err(ControllerError::Validation(
                        "coordinate must be a pair of finite numbers".to_string(),
                    ));
                }
            }
            RobotCommand::MouseScroll { steps, .. } => {
                if *steps < 1 {
                    return Err(ControllerError::Validation(
                        "steps must be a positive integer".to_string(),
                    ));
                }
            }
            RobotCommand::KeyboardTap { key, .. } | RobotCommand::KeyboardToggle { key, .. } => {
                check_key(key)?;
            }
            RobotCommand::ScreenCapture { region, .. } => {
                for (value, name) in [
                    (region.x, "x"),
                    (region.y, "y"),
                    (region.width, "width"),
                    (region.height, "height"),
                ] {
                    check_non_negative(value, name)?;
                }
            }
            RobotCommand::ScreenGetPixel { x, y } => {
                check_non_negative(*x, "x")?;
                check_non_negative(*y, "y")?;
            }
            RobotCommand::WindowActivate { target } => match target {
                WindowTarget::Name(name) => {
                    if name.trim().is_empty() {
                        return Err(ControllerError::Validation(
                            "window name must be a non-empty string".to_string(),
                        ));
                    }
                }
                WindowTarget::Pid(pid) => check_pid(*pid)?,
            },
            RobotCommand::WindowKill { pid } | RobotCommand::ProcessKill { pid } => {
                check_pid(*pid)?;
            }
            // Any text is acceptable; it travels as one argv element.
            RobotCommand::KeyboardType { .. } | RobotCommand::ClipboardWrite { .. } => {}
            RobotCommand::MouseClick { .. }
            | RobotCommand::MouseToggle { .. }
            | RobotCommand::ScreenSize
            | RobotCommand::WindowTitle
            | RobotCommand::ClipboardRead
            | RobotCommand::ProcessList => {}
        }
        Ok(())
    }

    /// Render the argv for the binary at `cli_path`. Call [`validate`] first.
    ///
    /// [`validate`]: RobotCommand::validate
    pub fn to_command_line(&self, cli_path: &str) -> CommandLine {
        let mut args: Vec<String> = Vec::new();
        let mut push = |parts: &[&str]| args.extend(parts.iter().map(|p| p.to_string()));

        match self {
            RobotCommand::MouseMove { x, y } => {
                let (x, y) = (x.to_string(), y.to_string());
                push(&["mouse", "move", "--x", x.as_str(), "--y", y.as_str()]);
            }
            RobotCommand::MouseClick { button, double } => {
                push(&["mouse", "click", "--button", button.as_str()]);
                if *double {
                    push(&["--double", "true"]);
                }
            }
            RobotCommand::MouseScroll { direction, steps } => {
                push(&[
                    "mouse",
                    "scroll",
                    "--direction",
                    direction.as_str(),
                    "--steps",
                    steps.to_string().as_str(),
                ]);
            }
            RobotCommand::MouseToggle { button, state } => {
                push(&[
                    "mouse",
                    "toggle",
                    "--button",
                    button.as_str(),
                    "--state",
                    state.as_str(),
                ]);
            }
            RobotCommand::KeyboardType { text } => {
                push(&["keyboard", "type", "--text", text.as_str()]);
            }
            RobotCommand::KeyboardTap { key, mods } => {
                push(&["keyboard", "tap", "--key", key.as_str()]);
                if !mods.is_empty() {
                    let joined = mods
                        .iter()
                        .map(Modifier::as_str)
                        .collect::<Vec<_>>()
                        .join(",");
                    push(&["--mods", joined.as_str()]);
                }
            }
            RobotCommand::KeyboardToggle { key, state } => {
                push(&["keyboard", "toggle", "--key", key.as_str(), "--state", state.as_str()]);
            }
            RobotCommand::ScreenCapture { region, full } => {
                if *full {
                    push(&["screen", "capture", "--full"]);
                } else {
                    push(&[
                        "screen",
                        "capture",
                        "--x",
                        region.x.to_string().as_str(),
                        "--y",
                        region.y.to_string().as_str(),
                        "--width",
                        region.width.to_string().as_str(),
                        "--height",
                        region.height.to_string().as_str(),
                    ]);
                }
            }
            RobotCommand::ScreenGetPixel { x, y } => {
                let (x, y) = (x.to_string(), y.to_string());
                push(&["screen", "getpixel", "--x", x.as_str(), "--y", y.as_str()]);
            }
            RobotCommand::ScreenSize => push(&["screen", "size"]),
            RobotCommand::WindowActivate { target } => match target {
                WindowTarget::Name(name) => {
                    push(&["window", "activate", "--name", name.as_str()])
                }
                WindowTarget::Pid(pid) => {
                    push(&["window", "activate", "--pid", pid.to_string().as_str()])
                }
            },
            RobotCommand::WindowKill { pid } => {
                push(&["window", "kill", "--pid", pid.to_string().as_str()]);
            }
            RobotCommand::WindowTitle => push(&["window", "title"]),
            RobotCommand::ClipboardRead => push(&["clipboard", "read"]),
            RobotCommand::ClipboardWrite { text } => {
                push(&["clipboard", "write", "--text", text.as_str()]);
            }
            RobotCommand::ProcessList => push(&["process", "list"]),
            RobotCommand::ProcessKill { pid } => {
                push(&["process", "kill", "--pid", pid.to_string().as_str()]);
            }
        }

        CommandLine::new(cli_path, args)
    }

    /// Bytes of caller-supplied payload, for the audit log.
    pub fn argument_bytes(&self) -> usize {
        match self {
            RobotCommand::KeyboardType { text } | RobotCommand::ClipboardWrite { text } => {
                text.len()
            }
            RobotCommand::KeyboardTap { key, .. } | RobotCommand::KeyboardToggle { key, .. } => {
                key.len()
            }
            RobotCommand::WindowActivate {
                target: WindowTarget::Name(name),
            } => name.len(),
            _ => 0,
        }
    }
}

fn check_key(key: &str) -> ControllerResult<()> {
    if key.trim().is_empty() {
        return Err(ControllerError::Validation(
            "key must be a non-empty string".to_string(),
        ));
    }
    Ok(())
}

fn check_non_negative(value: i64, name: &str) -> ControllerResult<()> {
    if value < 0 {
        return Err(ControllerError::Validation(format!(
            "{} must be a non-negative integer",
            name
        )));
    }
    Ok(())
}

fn check_pid(pid: i64) -> ControllerResult<()> {
    if pid <= 0 {
        return Err(ControllerError::Validation(
            "pid must be a positive integer".to_string(),
        ));
    }
    Ok(())
}

/// Parse modifier names; an empty list means no modifiers.
pub fn parse_modifiers<S: AsRef<str>>(mods: &[S]) -> ControllerResult<Vec<Modifier>> {
    mods.iter().map(|m| m.as_ref().parse()).collect()
}

/// An argv to run inside the container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandLine {
    program: String,
    args: Vec<String>,
}

impl CommandLine {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn to_argv(&self) -> Vec<String> {
        let mut argv = Vec::with_capacity(self.args.len() + 1);
        argv.push(self.program.clone());
        argv.extend(self.args.iter().cloned());
        argv
    }
}

impl fmt::Display for CommandLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", shell_quote(&self.program))?;
        for arg in &self.args {
            write!(f, " {}", shell_quote(arg))?;
        }
        Ok(())
    }
}

/// POSIX single-quote `value` unless it is made only of safe characters.
pub fn shell_quote(value: &str) -> String {
    let safe = !value.is_empty()
        && value
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "-_./,:=@%+".contains(c));
    if safe {
        return value.to_string();
    }

    let mut escaped = String::with_capacity(value.len() + 2);
    escaped.push('\'');
    for ch in value.chars() {
        if ch == '\'' {
            escaped.push_str("'\\''");
        } else {
            escaped.push(ch);
        }
    }
    escaped.push('\'');
    escaped
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLI: &str = "/usr/local/bin/robotgo-cli";

    fn args_of(cmd: &RobotCommand) -> Vec<String> {
        cmd.validate().unwrap();
        cmd.to_command_line(CLI).args().to_vec()
    }

    #[test]
    fn test_mouse_move_renders_coordinates() {
        let args = args_of(&RobotCommand::MouseMove { x: 100.0, y: 200.0 });
        assert_eq!(args, vec!["mouse", "move", "--x", "100", "--y", "200"]);

        let args = args_of(&RobotCommand::MouseMove { x: 10.5, y: 0.0 });
        assert_eq!(args[3], "10.5");
    }

    #[test]
    fn test_mouse_move_rejects_non_finite() {
        for (x, y) in [(f64::NAN, 1.0), (1.0, f64::INFINITY), (f64::NEG_INFINITY, 0.0)] {
            let err = RobotCommand::MouseMove { x, y }.validate().unwrap_err();
            assert!(matches!(err, ControllerError::Validation(_)));
        }
    }

    #[test]
    fn test_double_click_flag() {
        let single = args_of(&RobotCommand::MouseClick {
            button: MouseButton::Left,
            double: false,
        });
        assert_eq!(single, vec!["mouse", "click", "--button", "left"]);

        let double = args_of(&RobotCommand::MouseClick {
            button: MouseButton::Right,
            double: true,
        });
        assert_eq!(
            double,
            vec!["mouse", "click", "--button", "right", "--double", "true"]
        );
    }

    #[test]
    fn test_enum_parsing() {
        assert_eq!("middle".parse::<MouseButton>().unwrap(), MouseButton::Middle);
        assert!("wheelLeft".parse::<MouseButton>().is_err());
        assert!("sideways".parse::<ScrollDirection>().is_err());
        assert!("pressed".parse::<ToggleState>().is_err());
        assert_eq!("CTRL".parse::<Modifier>().unwrap(), Modifier::Ctrl);
        assert!("hyper".parse::<Modifier>().is_err());
    }

    #[test]
    fn test_scroll_steps_must_be_positive() {
        for steps in [0, -3] {
            let cmd = RobotCommand::MouseScroll {
                direction: ScrollDirection::Down,
                steps,
            };
            assert!(matches!(cmd.validate(), Err(ControllerError::Validation(_))));
        }
    }

    #[test]
    fn test_keyboard_tap_with_mods() {
        let mods = parse_modifiers(&["ctrl", "shift"]).unwrap();
        let args = args_of(&RobotCommand::KeyboardTap {
            key: "t".to_string(),
            mods,
        });
        assert_eq!(args, vec!["keyboard", "tap", "--key", "t", "--mods", "ctrl,shift"]);
    }

    #[test]
    fn test_blank_key_rejected() {
        let cmd = RobotCommand::KeyboardToggle {
            key: "  ".to_string(),
            state: ToggleState::Down,
        };
        assert!(matches!(cmd.validate(), Err(ControllerError::Validation(_))));
    }

    #[test]
    fn test_screen_capture_full_short_circuits_region() {
        let args = args_of(&RobotCommand::ScreenCapture {
            region: Region::default(),
            full: true,
        });
        assert_eq!(args, vec!["screen", "capture", "--full"]);

        let args = args_of(&RobotCommand::ScreenCapture {
            region: Region {
                x: 5,
                y: 6,
                width: 640,
                height: 480,
            },
            full: false,
        });
        assert_eq!(
            args,
            vec!["screen", "capture", "--x", "5", "--y", "6", "--width", "640", "--height", "480"]
        );
    }

    #[test]
    fn test_negative_region_rejected() {
        let cmd = RobotCommand::ScreenCapture {
            region: Region {
                width: -1,
                ..Region::default()
            },
            full: false,
        };
        let err = cmd.validate().unwrap_err();
        assert!(err.to_string().contains("width"));
    }

    #[test]
    fn test_window_target_requires_exactly_one() {
        assert!(WindowTarget::from_parts(Some("Firefox"), Some(12)).is_err());
        assert!(WindowTarget::from_parts(None, None).is_err());
        assert_eq!(
            WindowTarget::from_parts(None, Some(12)).unwrap(),
            WindowTarget::Pid(12)
        );

        let cmd = RobotCommand::WindowActivate {
            target: WindowTarget::Pid(0),
        };
        assert!(cmd.validate().is_err());
    }

    #[test]
    fn test_shell_metacharacters_stay_one_argument() {
        let payload = "\"; rm -rf /";
        for cmd in [
            RobotCommand::KeyboardType {
                text: payload.to_string(),
            },
            RobotCommand::ClipboardWrite {
                text: payload.to_string(),
            },
        ] {
            let line = cmd.to_command_line(CLI);
            assert_eq!(line.args().last().map(String::as_str), Some(payload));
            assert!(line.to_string().ends_with("--text '\"; rm -rf /'"));
        }
    }

    #[test]
    fn test_shell_quote_single_quotes() {
        assert_eq!(shell_quote("plain-value"), "plain-value");
        assert_eq!(shell_quote(""), "''");
        assert_eq!(shell_quote("it's"), "'it'\\''s'");
        assert_eq!(shell_quote("$(reboot)"), "'$(reboot)'");
    }

    #[test]
    fn test_argv_starts_with_program() {
        let line = RobotCommand::ProcessList.to_command_line(CLI);
        assert_eq!(line.to_argv(), vec![CLI, "process", "list"]);
        assert_eq!(line.to_string(), format!("{} process list", CLI));
    }
}
