use grid_astar_stepper::{CellState, GridModel, Point, Session, SessionConfig, Status};
use rand::{rngs::StdRng, SeedableRng};

// Runs a search on a randomized 13x13 grid the way an interactive front-end would: a few ticks
// are printed with their open (o) and closed (x) cells, then the search runs to the end and the
// path is exported as JSON.
//
// - # marks an obstacle
// - S marks the start
// - G marks the goal

fn render(session: &Session) {
    let grid = session.grid();
    for y in 0..grid.size() as i32 {
        let line: String = (0..grid.size() as i32)
            .map(|x| {
                let p = Point::new(x, y);
                match grid.cell(p) {
                    Some(CellState::Free) => {
                        if session.path().is_some_and(|path| path.contains(&p)) {
                            '*'
                        } else if session.open_set().contains(&p) {
                            'o'
                        } else if session.closed_set().contains(&p) {
                            'x'
                        } else {
                            '.'
                        }
                    }
                    Some(CellState::Obstacle) => '#',
                    Some(CellState::Start) => 'S',
                    Some(CellState::Goal) => 'G',
                    None => ' ',
                }
            })
            .collect();
        println!("{}", line);
    }
    println!("{}\n", session.status());
}

fn main() {
    let mut rng = StdRng::seed_from_u64(42);
    let config = SessionConfig {
        speed: 0.0,
        ..SessionConfig::default()
    };
    let mut session = Session::new(GridModel::default(), config);
    session.randomize(&mut rng);
    let last = session.grid().size() as i32 - 1;
    // Random obstacles may cover the corners, clear them before placing the endpoints.
    session.erase_obstacle(Point::new(0, 0));
    session.erase_obstacle(Point::new(last, last));
    session.set_start(Point::new(0, 0)).unwrap();
    session.set_goal(Point::new(last, last)).unwrap();

    if let Err(e) = session.find_path() {
        println!("Could not start: {}", e);
        return;
    }
    for _ in 0..3 {
        session.tick().unwrap();
        render(&session);
    }
    session.set_speed(1.0);
    while session.is_running() {
        session.tick().unwrap();
    }
    render(&session);

    if let Status::Found(_) = session.status() {
        let mut out = Vec::new();
        session.export_path(&mut out).unwrap();
        println!("{}", String::from_utf8_lossy(&out));
    }
}
