//! Interactive console: menu loop, validated input and result printouts

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::{Duration, Instant};

use rand::Rng;

use crate::convergence::{ConvergenceOutcome, ConvergenceTask, TaskEvent};
use crate::error::{Error, Result};
use crate::render;
use crate::rl::QLearning;

pub const YES_SYNONYMS: &[&str] = &[
    "y", "yes", "ye", "yea", "yeah", "yep", "yay", "aye", "arr", "sure", "j", "ja", "jap", "jep",
    "jo", "joa",
];
pub const NO_SYNONYMS: &[&str] = &[
    "n", "no", "nay", "nope", "exit", "quit", "stop", "nein", "ne", "nö",
];

pub const HEARTBEAT: Duration = Duration::from_secs(1);

pub struct Console<I, O> {
    input: I,
    output: O,
}

impl<I: BufRead, O: Write> Console<I, O> {
    pub fn new(input: I, output: O) -> Self {
        Self { input, output }
    }

    pub fn output(&mut self) -> &mut O {
        &mut self.output
    }

    pub fn into_output(self) -> O {
        self.output
    }

    pub fn print(&mut self, text: &str) -> Result<()> {
        self.output.write_all(text.as_bytes())?;
        self.output.flush()?;
        Ok(())
    }

    /// Show `text` and read one line, without the line break.
    pub fn prompt(&mut self, text: &str) -> Result<String> {
        self.print(text)?;
        let mut line = String::new();
        if self.input.read_line(&mut line)? == 0 {
            return Err(Error::Io {
                operation: "read console input".to_string(),
                source: io::Error::new(io::ErrorKind::UnexpectedEof, "input closed"),
            });
        }
        Ok(line.trim_end_matches(&['\r', '\n'][..]).to_string())
    }

    /// Ask until the answer parses as `T` and lies within the bounds.
    pub fn secure_input<T>(&mut self, text: &str, lower: Option<T>, upper: Option<T>) -> Result<T>
    where
        T: FromStr + PartialOrd,
    {
        loop {
            let answer = self.prompt(text)?;
            match answer.trim().parse::<T>() {
                Ok(value)
                    if lower.as_ref().map_or(true, |l| value >= *l)
                        && upper.as_ref().map_or(true, |u| value <= *u) =>
                {
                    return Ok(value)
                }
                _ => self.print("Invalid input. Try again!\n\n")?,
            }
        }
    }

    pub fn ask_yes_no(&mut self, text: &str) -> Result<bool> {
        self.print(&render::separator(false, true))?;
        loop {
            let answer = self.prompt(text)?.trim().to_lowercase();
            if YES_SYNONYMS.contains(&answer.as_str()) {
                return Ok(true);
            }
            if NO_SYNONYMS.contains(&answer.as_str()) {
                return Ok(false);
            }
            self.print("What d'ye want, matey?\n\n")?;
        }
    }

    pub fn wait_for_enter(&mut self, text: &str) -> Result<()> {
        self.prompt(text).map(|_| ())
    }

    /// Ask for a gridworld file name until an existing file is given.
    pub fn ask_grid_path(&mut self) -> Result<PathBuf> {
        loop {
            let answer = self.prompt("Enter Gridworld filename (e.g. 3by4.grid): ")?;
            let path = PathBuf::from(answer.trim());
            if path.is_file() {
                self.print("\n")?;
                return Ok(path);
            }
            self.print("Invalid filename, try again!\n\n")?;
        }
    }
}

/// Run the convergence search on a worker, writing a dot per `heartbeat`
/// while it is busy.
pub fn converge_with_heartbeat<R, W>(
    out: &mut W,
    learner: QLearning<R>,
    threshold: usize,
    heartbeat: Duration,
    keep_history: bool,
) -> Result<ConvergenceOutcome<R>>
where
    R: Rng + Send + 'static,
    W: Write,
{
    let task = ConvergenceTask::spawn(learner, threshold, keep_history);
    write!(out, "\nCalculating")?;
    out.flush()?;
    let mut next_tick = Instant::now() + heartbeat;
    loop {
        let timeout = next_tick.saturating_duration_since(Instant::now());
        match task.next_event(timeout) {
            TaskEvent::Finished => break,
            TaskEvent::Episode(_) | TaskEvent::Heartbeat => {}
        }
        if Instant::now() >= next_tick {
            write!(out, ".")?;
            out.flush()?;
            next_tick += heartbeat;
        }
    }
    writeln!(out)?;
    task.join()
}

pub fn q_function_and_policy<R: Rng>(learner: &QLearning<R>) -> String {
    format!(
        "Calculated Q-function values:\n{}Derived policy:\n{}",
        render::q_function(&learner.format_q_function(), learner.env().actions()),
        render::policy(&learner.format_policy())
    )
}

pub fn convergence_summary(episodes: usize, converged_after: usize) -> String {
    format!(
        "\nCalculated {} episodes, policy converged after {} episodes.\n",
        episodes, converged_after
    )
}

pub fn run<I, O, R>(console: &mut Console<I, O>, mut learner: QLearning<R>) -> Result<QLearning<R>>
where
    I: BufRead,
    O: Write,
    R: Rng + Send + 'static,
{
    console.print("Your input Gridworld:\n")?;
    console.print(&render::gridworld(learner.env().grid()))?;
    loop {
        let params = learner.params().clone();
        console.print(&render::headline("Menu"))?;
        console.print(&format!(
            "What do you want to do? Enter the corresponding number.\n\n\
             [1] Automatic Q-learning until convergence\n\
             [2] Automatic Q-learning episode\n\
             [3] Manual step-by-step Q-learning episode\n\
             [4] Print current Q-function values and derived policy\n\
             [5] Reset Q-function and derived policy\n\
             [6] Change the exploration rate for the epsilon-soft policy (epsilon). Currently set to {}\n\
             [7] Change the learning rate (alpha). Currently set to {}\n\
             [8] Change the discount factor of future rewards (gamma). Currently set to {}\n\
             [9] Change the convergence threshold (episodes with unchanged policy). Currently set to {}\n\
             [0] Exit the program\n\n",
            params.epsilon,
            params.learning_rate,
            params.discount_factor,
            params.convergence_threshold
        ))?;

        match console.secure_input::<u32>("Choose: ", Some(0), Some(9))? {
            1 => {
                console.print(&render::separator(true, true))?;
                learner = until_convergence(console, learner)?;
                console.wait_for_enter("Press Enter to return to the main menu...")?;
            }
            2 => loop {
                learner.episode()?;
                console.print(&render::headline("Results"))?;
                console.print(&q_function_and_policy(&learner))?;
                if !console.ask_yes_no(
                    "Do you want to run another episode? (No will return to the main menu)\n> ",
                )? {
                    break;
                }
            },
            3 => manual_episode(console, &mut learner)?,
            4 => {
                console.print(&render::separator(true, true))?;
                console.print(&q_function_and_policy(&learner))?;
                console.wait_for_enter("\nPress Enter to return to the main menu...")?;
            }
            5 => {
                learner.reset();
                console.print("\nQ-function successfully reset.\n")?;
            }
            6 => {
                console.print(&render::separator(true, true))?;
                let epsilon = console.secure_input(
                    "Enter a new epsilon value between 0 and 1: ",
                    Some(0.0),
                    Some(1.0),
                )?;
                learner.set_epsilon(epsilon)?;
                console.print("\nEpsilon value successfully changed.\n")?;
            }
            7 => {
                console.print(&render::separator(true, true))?;
                let rate = console.secure_input(
                    "Enter a new learning rate between 0 and 1: ",
                    Some(0.0),
                    Some(1.0),
                )?;
                learner.set_learning_rate(rate)?;
                console.print("\nLearning rate successfully changed.\n")?;
            }
            8 => {
                console.print(&render::separator(true, true))?;
                let discount = console.secure_input(
                    "Enter a new discount factor between 0 and 1: ",
                    Some(0.0),
                    Some(1.0),
                )?;
                learner.set_discount_factor(discount)?;
                console.print("\nDiscount factor successfully changed.\n")?;
            }
            9 => {
                console.print(&render::separator(true, true))?;
                let threshold = console.secure_input(
                    "Enter a new convergence threshold: ",
                    Some(1usize),
                    None,
                )?;
                learner.set_convergence_threshold(threshold)?;
                console.print("\nConvergence threshold successfully changed.\n")?;
            }
            _ => break,
        }
    }
    console.print(&render::headline("See you later"))?;
    Ok(learner)
}

fn until_convergence<I, O, R>(
    console: &mut Console<I, O>,
    learner: QLearning<R>,
) -> Result<QLearning<R>>
where
    I: BufRead,
    O: Write,
    R: Rng + Send + 'static,
{
    let threshold = learner.params().convergence_threshold;
    let outcome = converge_with_heartbeat(console.output(), learner, threshold, HEARTBEAT, false)?;
    let report = outcome.result?;
    console.print(&convergence_summary(
        report.episodes,
        report.converged_after().unwrap_or(report.episodes),
    ))?;
    console.print(&render::headline("Results"))?;
    console.print(&q_function_and_policy(&outcome.learner))?;
    Ok(outcome.learner)
}

fn manual_episode<I, O, R>(console: &mut Console<I, O>, learner: &mut QLearning<R>) -> Result<()>
where
    I: BufRead,
    O: Write,
    R: Rng,
{
    learner.reset_current_state();
    loop {
        let last_state = learner.current_state();
        console.print(&render::separator(true, true))?;
        console.print(&format!("Agent was previously on field: {}\n", last_state))?;
        learner.step()?;
        console.print(&format!("Agent moved to field: {}\n", learner.current_state()))?;
        let agent = learner.agent();
        console.print(&format!(
            "Steps this episode: {}, reward collected: {:.2}\n",
            agent.steps, agent.reward
        ))?;
        console.print("\n\nCalculated Q-function values:\n")?;
        console.print(&render::q_function(
            &learner.format_q_function(),
            learner.env().actions(),
        ))?;
        if learner.env().is_terminal(last_state) {
            console.print("Agent moved from a terminal state and therefore the episode ended.\n\n")?;
            console.wait_for_enter("Press Enter to return to the main menu...")?;
            break;
        }
        if !console.ask_yes_no("Run next step? (No will return to the main menu)\n> ")? {
            break;
        }
    }
    learner.update_policy();
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn console(input: &str) -> Console<Cursor<Vec<u8>>, Vec<u8>> {
        Console::new(Cursor::new(input.as_bytes().to_vec()), Vec::new())
    }

    #[test]
    fn secure_input_retries_until_valid() {
        let mut c = console("abc\n12\n-1\n5\n");
        let value: u32 = c.secure_input("Choose: ", Some(0), Some(9)).unwrap();
        assert_eq!(value, 5);
        let out = String::from_utf8(c.into_output()).unwrap();
        assert_eq!(out.matches("Invalid input. Try again!").count(), 3);
    }

    #[test]
    fn secure_input_fails_on_closed_input() {
        let mut c = console("oops\n");
        let result: Result<f64> = c.secure_input("x: ", Some(0.0), Some(1.0));
        assert!(matches!(result, Err(Error::Io { .. })));
    }

    #[test]
    fn yes_no_accepts_synonyms() {
        let mut c = console("maybe\n  AYE \nnein\n");
        assert!(c.ask_yes_no("? ").unwrap());
        assert!(!c.ask_yes_no("? ").unwrap());
        let out = String::from_utf8(c.into_output()).unwrap();
        assert!(out.contains("What d'ye want, matey?"));
    }
}
