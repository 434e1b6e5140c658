use tabled::Tabled;

#[derive(Tabled)]
pub struct RunRow {
    pub scenario: String,
    pub pvc_size: String,
    pub replicas: u32,
    pub active: u8,
    #[tabled(display = "optional_float2")]
    pub total_duration_s: Option<f64>,
}

#[derive(Tabled)]
pub struct LatencyHistogramRow {
    pub scenario: String,
    pub ns_group: String,
    pub count: u64,
    #[tabled(display = "float2")]
    pub sum_s: f64,
    #[tabled(display = "float2")]
    pub mean_s: f64,
}

#[derive(Tabled)]
pub struct ErrorRow {
    pub stage: String,
    pub count: u64,
}

fn float2(n: &f64) -> String {
    format!("{:.2}", n)
}

fn optional_float2(n: &Option<f64>) -> String {
    n.as_ref().map(float2).unwrap_or_else(|| "-".to_string())
}
