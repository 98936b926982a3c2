//! 地图、航点与巡逻

use crate::display;
use crate::session::Session;
use anyhow::Result;
use clap::{Args, Subcommand};
use raisin_sdk::{RaisinClient, ServiceResult, Waypoint};
use std::process::ExitCode;

#[derive(Args, Debug)]
pub struct PatrolCommand {
    /// 机器人 ID 或 `ip[:port]`
    pub robot: String,

    #[command(subcommand)]
    pub action: PatrolAction,
}

#[derive(Subcommand, Debug)]
pub enum PatrolAction {
    /// 加载地图并上传巡逻路线
    Waypoints {
        /// 地图名（航点的坐标系）
        #[arg(long)]
        map: String,

        /// 巡逻圈数
        #[arg(long, default_value_t = 1)]
        laps: u32,

        /// 航点坐标 `x,y`
        #[arg(required = true, value_parser = parse_point, allow_hyphen_values = true)]
        points: Vec<(f64, f64)>,
    },
    /// 从最近的航点恢复巡逻
    Resume,
    /// 列出机器人上保存的路线文件
    Files,
    /// 加载路线文件
    Load { name: String },
    /// 查询任务状态
    Mission,
}

/// 解析 `x,y`
pub fn parse_point(text: &str) -> Result<(f64, f64), String> {
    let (x, y) = text
        .split_once(',')
        .ok_or_else(|| format!("expected x,y, got '{}'", text))?;
    let x = x
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid x coordinate in '{}'", text))?;
    let y = y
        .trim()
        .parse::<f64>()
        .map_err(|_| format!("invalid y coordinate in '{}'", text))?;
    if !x.is_finite() || !y.is_finite() {
        return Err(format!("coordinates must be finite: '{}'", text));
    }
    Ok((x, y))
}

fn report(result: &ServiceResult) -> ExitCode {
    println!("{}", display::result_line(result));
    if result.success {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

impl PatrolCommand {
    pub fn execute(&self, session: &Session) -> Result<ExitCode> {
        let Some(client) = session.connect(&self.robot)? else {
            return Ok(ExitCode::SUCCESS);
        };
        let code = self.run(&client);
        client.disconnect();
        Ok(code)
    }

    fn run(&self, client: &RaisinClient) -> ExitCode {
        match &self.action {
            PatrolAction::Waypoints { map, laps, points } => {
                let result = client.set_map(map);
                if !result.success {
                    return report(&result);
                }
                let route: Vec<Waypoint> = points
                    .iter()
                    .map(|&(x, y)| Waypoint::new(map.as_str(), x, y))
                    .collect();
                println!("Uploading {} waypoints on map '{}' ({} laps)", route.len(), map, laps);
                report(&client.set_waypoints(&route, *laps))
            },
            PatrolAction::Resume => {
                let outcome = client.resume_patrol();
                if let Some(index) = outcome.value {
                    println!("Resuming patrol from waypoint {}", index);
                }
                report(&outcome.result)
            },
            PatrolAction::Files => {
                let outcome = client.list_waypoints_files();
                if let Some(files) = &outcome.value {
                    if files.is_empty() {
                        println!("No waypoint files.");
                    }
                    for file in files {
                        println!("  {}", file);
                    }
                }
                report(&outcome.result)
            },
            PatrolAction::Load { name } => report(&client.load_waypoints_file(name)),
            PatrolAction::Mission => {
                let outcome = client.query_mission_status();
                if let Some(status) = &outcome.value {
                    println!(
                        "Mission: {} | current waypoint: {}",
                        if status.valid { "active" } else { "none" },
                        status.current_index
                    );
                }
                report(&outcome.result)
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_point() {
        assert_eq!(parse_point("1.5,-2").unwrap(), (1.5, -2.0));
        assert_eq!(parse_point(" 0 , 3 ").unwrap(), (0.0, 3.0));
    }

    #[test]
    fn test_parse_point_rejects_garbage() {
        assert!(parse_point("1.5").is_err());
        assert!(parse_point("a,2").is_err());
        assert!(parse_point("1,nan").is_err());
    }
}
