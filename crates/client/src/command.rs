use crate::widgets::results::ResultTab;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Submit a problem statement. The text is everything after `solve`.
    Solve { problem: String },
    Status,
    Tab(ResultTab),
    Export { path: Option<String> },
    Open,
    Reset,
    Quit,
    Unknown(String),
}

/// A completion entry: the word to insert, what it does, its argument hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CommandSpec {
    pub name: &'static str,
    pub about: &'static str,
    pub args: &'static str,
}

const fn spec(name: &'static str, about: &'static str, args: &'static str) -> CommandSpec {
    CommandSpec { name, about, args }
}

pub const WORKSPACE_COMMANDS: &[CommandSpec] = &[
    spec("solve", "submit a geometry problem", "<problem text>"),
    spec("status", "re-check the tracked task on the server", ""),
    spec("tab", "show a result pane", "<parsed|commands|explanation>"),
    spec("export", "write the command list to a file", "[path]"),
    spec("open", "show the GeoGebra link for the commands", ""),
    spec("reset", "forget the task and clear all panes", ""),
    spec("quit", "disconnect and exit", ""),
];

/// Argument completions for `tab`.
pub const TAB_NAMES: &[CommandSpec] = &[
    spec("parsed", "parsed problem elements", ""),
    spec("commands", "filtered GeoGebra commands", ""),
    spec("explanation", "solution explanation", ""),
];

/// Lowercased first word and the untouched remainder.
fn split_head(input: &str) -> (String, &str) {
    match input.split_once(char::is_whitespace) {
        Some((head, rest)) => (head.to_lowercase(), rest.trim()),
        None => (input.to_lowercase(), ""),
    }
}

/// Strip one pair of matching quotes.
fn unquote(arg: &str) -> &str {
    ['"', '\'']
        .into_iter()
        .find_map(|q| arg.strip_prefix(q).and_then(|a| a.strip_suffix(q)))
        .unwrap_or(arg)
}

pub fn parse_command(input: &str) -> Command {
    let input = input.trim();
    if input.is_empty() {
        return Command::Unknown(String::new());
    }

    let (head, rest) = split_head(input);
    match head.as_str() {
        // Problem text keeps its own quotes and spacing
        "solve" => Command::Solve {
            problem: rest.to_string(),
        },
        "status" => Command::Status,
        "tab" => match ResultTab::from_name(unquote(rest)) {
            Some(tab) => Command::Tab(tab),
            None => Command::Unknown("tab: <parsed|commands|explanation> required".into()),
        },
        "export" => Command::Export {
            path: (!rest.is_empty()).then(|| unquote(rest).to_string()),
        },
        "open" => Command::Open,
        "reset" => Command::Reset,
        "quit" | "q" => Command::Quit,
        _ => Command::Unknown(input.to_string()),
    }
}

fn matching(table: &[CommandSpec], prefix: &str) -> Vec<CommandSpec> {
    table
        .iter()
        .filter(|c| c.name.starts_with(prefix))
        .copied()
        .collect()
}

fn common_prefix(items: &[CommandSpec]) -> &'static str {
    let Some((first, others)) = items.split_first() else {
        return "";
    };
    let name: &'static str = first.name;
    let len = others.iter().fold(name.len(), |len, c| {
        name.bytes()
            .zip(c.name.bytes())
            .take(len)
            .take_while(|(a, b)| a == b)
            .count()
    });
    &name[..len]
}

/// Candidate list shown above the bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Completion {
    pub items: Vec<CommandSpec>,
    pub selected: usize,
    /// Command whose argument is being completed.
    pub parent: Option<&'static str>,
}

impl Completion {
    fn new(items: Vec<CommandSpec>, parent: Option<&'static str>) -> Option<Self> {
        (!items.is_empty()).then_some(Self {
            items,
            selected: 0,
            parent,
        })
    }

    pub fn current(&self) -> Option<&CommandSpec> {
        self.items.get(self.selected)
    }

    fn step(&mut self, forward: bool) {
        let n = self.items.len();
        self.selected = if forward {
            (self.selected + 1) % n
        } else {
            (self.selected + n - 1) % n
        };
    }

    fn line(&self) -> Option<String> {
        let item = self.current()?;
        Some(match self.parent {
            Some(parent) => format!("{} {}", parent, item.name),
            None => item.name.to_string(),
        })
    }
}

#[derive(Debug, Default)]
pub struct CommandBarState {
    pub input: String,
    pub cursor_pos: usize,
    pub active: bool,
    pub completion: Option<Completion>,
}

impl CommandBarState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn activate(&mut self) {
        self.activate_with("");
    }

    /// Activate with the input pre-filled, cursor at the end.
    pub fn activate_with(&mut self, text: &str) {
        self.active = true;
        self.set_input(text.to_string());
        self.completion = None;
    }

    pub fn deactivate(&mut self) {
        self.active = false;
        self.set_input(String::new());
        self.completion = None;
    }

    fn set_input(&mut self, input: String) {
        self.input = input;
        self.cursor_pos = self.input.len();
    }

    pub fn insert_char(&mut self, c: char) {
        self.input.insert(self.cursor_pos, c);
        self.cursor_pos += c.len_utf8();
        self.refresh_completion();
    }

    pub fn delete_char(&mut self) {
        if let Some(prev) = self.input[..self.cursor_pos].chars().next_back() {
            self.cursor_pos -= prev.len_utf8();
            self.input.remove(self.cursor_pos);
        }
        self.refresh_completion();
    }

    pub fn close_completion(&mut self) {
        self.completion = None;
    }

    /// What the input can complete to: command names, or pane names after `tab `.
    fn candidates(&self) -> (Vec<CommandSpec>, Option<&'static str>) {
        let query = self.input.trim_start().to_lowercase();
        if let Some(partial) = query.strip_prefix("tab ") {
            return (matching(TAB_NAMES, partial.trim()), Some("tab"));
        }
        if query.contains(char::is_whitespace) {
            return (Vec::new(), None);
        }
        (matching(WORKSPACE_COMMANDS, &query), None)
    }

    /// Narrow an open list as the user types.
    fn refresh_completion(&mut self) {
        if self.completion.is_some() {
            let (items, parent) = self.candidates();
            self.completion = Completion::new(items, parent);
        }
    }

    /// Tab key: accept the open list's selection, fill a unique match, or
    /// extend to the common prefix and list the candidates.
    pub fn tab_complete(&mut self) {
        if self.completion.is_some() {
            self.accept_completion();
            return;
        }

        let (items, parent) = self.candidates();
        match items.len() {
            0 => {}
            1 => match parent {
                Some(parent) => self.set_input(format!("{} {}", parent, items[0].name)),
                None => self.set_input(format!("{} ", items[0].name)),
            },
            _ => {
                let common = common_prefix(&items);
                if parent.is_none() && common.len() > self.input.trim().len() {
                    self.set_input(common.to_string());
                }
                self.completion = Completion::new(items, parent);
            }
        }
    }

    /// Fill the input from the selected item. Command names get a trailing
    /// space for their argument.
    pub fn accept_completion(&mut self) {
        let Some(completion) = self.completion.take() else {
            return;
        };
        if let Some(mut line) = completion.line() {
            if completion.parent.is_none() {
                line.push(' ');
            }
            self.set_input(line);
        }
    }

    pub fn select_prev(&mut self) {
        self.select(false);
    }

    pub fn select_next(&mut self) {
        self.select(true);
    }

    fn select(&mut self, forward: bool) {
        match self.completion.as_mut() {
            Some(completion) => completion.step(forward),
            None => {
                let (items, parent) = self.candidates();
                self.completion = Completion::new(items, parent);
            }
        }
    }

    pub fn submit(&mut self) -> Option<Command> {
        if self.completion.is_some() {
            self.accept_completion();
            return None;
        }
        let cmd = (!self.input.trim().is_empty()).then(|| parse_command(&self.input));
        self.deactivate();
        cmd
    }
}
