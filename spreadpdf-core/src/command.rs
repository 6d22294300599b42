/// One input symbol delivered by the front end.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Symbol {
    Char(char),
    Up,
    Down,
    Left,
    Right,
    ScrollUp,
    ScrollDown,
}

/// An executable command with its numeric prefix already resolved.
/// `count` is the "single" value; spread-wise moves multiply it by the split
/// count when applied.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    NextSpread { count: usize },
    PrevSpread { count: usize },
    NextPage { count: usize },
    PrevPage { count: usize },
    InsertBlankLeft,
    InsertBlankRight,
    ToggleFirstBlank,
    GotoSpread { page: Option<usize> },
    GotoPage { page: Option<usize> },
    Invert,
    Reload,
    Save,
    SetSplit { count: Option<usize> },
    Quit,
    SetPageNumberDelta { printed: usize },
    ClearPageNumberDelta,
    GotoPrintedPage { printed: usize },
    PutMark { key: char },
    GotoMark { key: char },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InputState {
    #[default]
    Idle,
    AccumulatingCount,
    AwaitingMarkLabel,
    AwaitingJumpLabel,
}

/// Result of feeding one symbol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Feed {
    /// Consumed as part of a prefix or sequence; nothing to run yet.
    Pending,
    /// Not bound to anything; state is unchanged.
    Ignored,
    Execute(Command),
}

/// Every this-many executed commands the session writes its state out.
pub const AUTOSAVE_INTERVAL: usize = 11;

#[derive(Debug, Default)]
pub struct CommandInterpreter {
    state: InputState,
    count: Option<usize>,
    digits: String,
    executed_since_save: usize,
}

impl CommandInterpreter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self) -> InputState {
        self.state
    }

    pub fn count(&self) -> Option<usize> {
        self.count
    }

    pub fn feed(&mut self, symbol: Symbol) -> Feed {
        match self.state {
            InputState::AwaitingMarkLabel => {
                self.finish_label(symbol, |key| Command::PutMark { key })
            }
            InputState::AwaitingJumpLabel => {
                self.finish_label(symbol, |key| Command::GotoMark { key })
            }
            InputState::Idle | InputState::AccumulatingCount => self.feed_normal(symbol),
        }
    }

    fn feed_normal(&mut self, symbol: Symbol) -> Feed {
        if let Symbol::Char(c) = symbol {
            if let Some(digit) = c.to_digit(10) {
                self.push_digit(digit as usize);
                return Feed::Pending;
            }
            match c {
                'm' => {
                    self.state = InputState::AwaitingMarkLabel;
                    return Feed::Pending;
                }
                '\'' => {
                    self.state = InputState::AwaitingJumpLabel;
                    return Feed::Pending;
                }
                _ => {}
            }
        }

        let single = self.count.unwrap_or(1);
        let command = match symbol {
            Symbol::Char('j') | Symbol::Down | Symbol::Right | Symbol::ScrollDown => {
                Command::NextSpread { count: single }
            }
            Symbol::Char('k') | Symbol::Up | Symbol::Left | Symbol::ScrollUp => {
                Command::PrevSpread { count: single }
            }
            Symbol::Char('J') => Command::NextPage { count: single },
            Symbol::Char('K') => Command::PrevPage { count: single },
            Symbol::Char('H') => Command::InsertBlankLeft,
            Symbol::Char('L') => Command::InsertBlankRight,
            Symbol::Char('b') => Command::ToggleFirstBlank,
            Symbol::Char('g') => Command::GotoSpread { page: self.count },
            Symbol::Char('G') => Command::GotoPage { page: self.count },
            Symbol::Char('v') => Command::Invert,
            Symbol::Char('r') => Command::Reload,
            Symbol::Char('w') => Command::Save,
            Symbol::Char('s') => Command::SetSplit { count: self.count },
            Symbol::Char('q') => Command::Quit,
            Symbol::Char('d') => Command::SetPageNumberDelta { printed: single },
            Symbol::Char('D') => Command::ClearPageNumberDelta,
            Symbol::Char('p') => Command::GotoPrintedPage { printed: single },
            _ => return Feed::Ignored,
        };
        self.reset();
        Feed::Execute(command)
    }

    fn finish_label(&mut self, symbol: Symbol, build: impl FnOnce(char) -> Command) -> Feed {
        self.reset();
        match symbol {
            Symbol::Char(key) => Feed::Execute(build(key)),
            _ => Feed::Pending,
        }
    }

    fn push_digit(&mut self, digit: usize) {
        let current = self.count.unwrap_or(0);
        self.count = Some(current.saturating_mul(10).saturating_add(digit));
        if let Some(c) = char::from_digit(digit as u32, 10) {
            self.digits.push(c);
        }
        self.state = InputState::AccumulatingCount;
    }

    fn reset(&mut self) {
        self.count = None;
        self.digits.clear();
        self.state = InputState::Idle;
    }

    /// Counts one executed command; returns true when an autosave is due.
    pub fn record_executed(&mut self) -> bool {
        self.executed_since_save += 1;
        if self.executed_since_save >= AUTOSAVE_INTERVAL {
            self.executed_since_save = 0;
            true
        } else {
            false
        }
    }

    /// What has been typed towards the next command, for the status line.
    pub fn pending_input(&self) -> Option<String> {
        let mut pending = self.digits.clone();
        match self.state {
            InputState::AwaitingMarkLabel => pending.push('m'),
            InputState::AwaitingJumpLabel => pending.push('\''),
            InputState::Idle | InputState::AccumulatingCount => {}
        }
        if pending.is_empty() {
            None
        } else {
            Some(pending)
        }
    }
}
