//! Interactive prompt

use std::io::{self, BufRead, Write};

use agent_market::ambiguity::ClarificationOption;
use agent_market::{Orchestrator, Response};

use crate::render;
use crate::session::Session;

const BANNER: &str = "\
market-query: 주식 관련 질문을 입력하세요.
  예) 어제 삼성전자 주가
      2024-01-15 기준 거래량이 50% 이상 증가한 종목
      20일 이동평균 5% 돌파 종목
      최근 5일 10% 이상 상승한 종목
  번호: 직전 선택지로 다시 질문, stats: 세션 통계, history: 질의 기록
  clear: 기록 초기화, debug: 단계별 결과 표시 전환, quit/exit: 종료
";

/// What one line of input asks the prompt to do
#[derive(Debug, PartialEq, Eq)]
enum Command<'a> {
    Skip,
    Quit,
    Stats,
    History,
    Clear,
    ToggleDebug,
    Ask(&'a str),
}

/// Numbers pick from the last clarification menu; anything else is a query
fn parse<'a>(input: &'a str, options: &'a [ClarificationOption]) -> Command<'a> {
    match input.trim() {
        "" => Command::Skip,
        "quit" | "exit" | "q" => Command::Quit,
        "stats" => Command::Stats,
        "history" => Command::History,
        "clear" => Command::Clear,
        "debug" => Command::ToggleDebug,
        text => {
            let picked = text
                .parse::<usize>()
                .ok()
                .and_then(|n| n.checked_sub(1))
                .and_then(|i| options.get(i));
            Command::Ask(picked.map_or(text, |option| option.value.as_str()))
        }
    }
}

pub async fn run(
    orchestrator: &Orchestrator,
    session: &mut Session,
    json: bool,
    mut debug: bool,
) -> anyhow::Result<()> {
    println!("{BANNER}");

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut options: Vec<ClarificationOption> = Vec::new();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut input = String::new();
        match stdin.lock().read_line(&mut input) {
            Ok(0) => {
                // EOF
                println!();
                break;
            }
            Ok(_) => {}
            Err(e) => {
                eprintln!("Error reading input: {e}");
                continue;
            }
        }

        match parse(&input, &options) {
            Command::Skip => {}
            Command::Quit => break,
            Command::Stats => println!("{}\n", session.stats().render()),
            Command::History => {
                for (index, query) in session.queries().enumerate() {
                    println!("{}. {query}", index + 1);
                }
                println!();
            }
            Command::Clear => {
                session.clear();
                println!("히스토리가 초기화되었습니다.\n");
            }
            Command::ToggleDebug => {
                debug = !debug;
                println!("debug {}", if debug { "on" } else { "off" });
            }
            Command::Ask(query) => {
                let query = query.to_string();
                let timed = session.ask(orchestrator, &query).await;
                println!("{}\n", render(&timed, json, debug)?);
                options = match timed.response {
                    Response::Clarification { options, .. } => options,
                    _ => Vec::new(),
                };
            }
        }
    }

    Ok(())
}
