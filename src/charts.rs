// Static chart catalog: declarative metadata mapping source fields to chart
// definitions. Built once at startup and served read-only; the presentation
// layer uses it to decide which series to request and how to label them.

use crate::models::Source;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChartType {
    Area,
    Bar,
    Candlestick,
    Sparkline,
    Scatter,
    Line,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DurationFormat {
    DurationSeconds,
    DurationMinutes,
}

#[derive(Debug, Clone, Serialize)]
pub struct SinceWindow {
    pub value: f64,
    /// One of minutes/hours/days/weeks/months/years.
    pub units: &'static str,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SeriesSpec {
    pub id: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub name: Option<&'static str>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub default_visible: bool,
}

impl SeriesSpec {
    fn id(id: &'static str) -> Self {
        Self {
            id,
            name: None,
            default_visible: false,
        }
    }

    fn named(id: &'static str, name: &'static str) -> Self {
        Self {
            id,
            name: Some(name),
            default_visible: false,
        }
    }

    fn visible(mut self) -> Self {
        self.default_visible = true;
        self
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChartDef {
    pub title: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_title: Option<&'static str>,
    #[serde(rename = "type")]
    pub chart_type: ChartType,
    pub source: Source,
    pub sub_source: &'static str,
    pub series: Vec<SeriesSpec>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub since: Option<SinceWindow>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub format: Option<DurationFormat>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub delta: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub relative_time: bool,
}

impl ChartDef {
    fn sparkline(
        title: &'static str,
        source: Source,
        sub_source: &'static str,
        field: &'static str,
        since: SinceWindow,
    ) -> Self {
        Self {
            title,
            sub_title: None,
            chart_type: ChartType::Sparkline,
            source,
            sub_source,
            series: vec![SeriesSpec::id(field)],
            since: Some(since),
            format: None,
            delta: false,
            relative_time: false,
        }
    }
}

fn since(value: f64, units: &'static str) -> SinceWindow {
    SinceWindow { value, units }
}

/// The full dashboard catalog: sparkline row first, then the per-source
/// detail charts.
pub fn catalog() -> Vec<ChartDef> {
    let mut charts = vec![
        ChartDef::sparkline(
            "Followers",
            Source::Twitter,
            "profile",
            "followers",
            since(1.0, "weeks"),
        ),
        ChartDef::sparkline(
            "Unread Emails",
            Source::Gmail,
            "inbox",
            "num_unread",
            since(3.0, "days"),
        ),
        ChartDef::sparkline("°F", Source::Weather, "temp", "temp", since(1.0, "days")),
        ChartDef::sparkline(
            "mph wind",
            Source::Weather,
            "wind",
            "speed",
            since(1.0, "days"),
        ),
        ChartDef::sparkline(
            "mi on bike",
            Source::Strava,
            "allTime",
            "distance",
            since(1.0, "weeks"),
        ),
    ];

    let mut school = ChartDef::sparkline(
        "School",
        Source::Trello,
        "total_time_in_label",
        "School",
        since(3.0, "days"),
    );
    school.format = Some(DurationFormat::DurationMinutes);
    charts.push(school);

    charts.push(ChartDef {
        title: "Twitter",
        sub_title: Some("Profile"),
        chart_type: ChartType::Area,
        source: Source::Twitter,
        sub_source: "profile",
        series: vec![
            SeriesSpec::named("followers", "Followers").visible(),
            SeriesSpec::named("following", "Following"),
            SeriesSpec::named("tweets", "Tweets"),
            SeriesSpec::named("lists", "Lists"),
        ],
        since: None,
        format: None,
        delta: false,
        relative_time: false,
    });

    charts.push(ChartDef {
        title: "Email",
        sub_title: Some("Inbox"),
        chart_type: ChartType::Area,
        source: Source::Gmail,
        sub_source: "inbox",
        series: vec![SeriesSpec::named("num_unread", "Unread").visible()],
        since: Some(since(3.0, "weeks")),
        format: None,
        delta: false,
        relative_time: false,
    });

    charts.push(ChartDef {
        title: "Sleep",
        sub_title: Some("Minutes per night"),
        chart_type: ChartType::Bar,
        source: Source::Fitbit,
        sub_source: "sleep",
        series: vec![SeriesSpec::named("minutesAsleep", "Asleep").visible()],
        since: Some(since(1.0, "months")),
        format: Some(DurationFormat::DurationMinutes),
        delta: false,
        relative_time: false,
    });

    charts.push(ChartDef {
        title: "Cycling",
        sub_title: Some("Distance gained"),
        chart_type: ChartType::Bar,
        source: Source::Strava,
        sub_source: "allTime",
        series: vec![SeriesSpec::named("distance", "Miles").visible()],
        since: None,
        format: None,
        delta: true,
        relative_time: false,
    });

    charts.push(ChartDef {
        title: "Portfolio",
        sub_title: Some("Daily candles"),
        chart_type: ChartType::Candlestick,
        source: Source::Stocks,
        sub_source: "portfolio",
        series: vec![SeriesSpec::id("close")],
        since: Some(since(3.0, "months")),
        format: None,
        delta: false,
        relative_time: false,
    });

    charts.push(ChartDef {
        title: "Tweet performance",
        sub_title: Some("Hours since posted"),
        chart_type: ChartType::Line,
        source: Source::Tscraper,
        sub_source: "likes",
        series: vec![SeriesSpec::id("likes")],
        since: None,
        format: None,
        delta: false,
        relative_time: true,
    });

    charts
}
